//! Step runner behaviour against a scripted session: marker gating, marker
//! write ordering, failure handling, and the refresh hook.

mod common;

use common::{test_config, FakeSession};
use notebook_provision::steps::jvm::{EnsureJreJdk, EnsureSbt, InstallMaven};
use notebook_provision::steps::misc::InstallGitlabCert;
use notebook_provision::steps::rstudio::InstallRstudio;
use notebook_provision::{marker_path, run_step, Application, StepOutcome};

#[test]
fn marker_present_skips_provisioning() {
    let marker = marker_path("datalab-user", "sbt");
    let session = FakeSession::new().with_existing_path(&marker);
    let config = test_config(Application::Jupyter);

    let outcome = run_step(&session, &config, &EnsureSbt).unwrap();

    assert_eq!(outcome, StepOutcome::AlreadyProvisioned);
    assert!(
        session.recorded().is_empty(),
        "no remote commands expected on a provisioned host, got {:?}",
        session.recorded()
    );
}

#[test]
fn marker_written_after_successful_provision() {
    let session = FakeSession::new();
    let config = test_config(Application::Jupyter);

    let outcome = run_step(&session, &config, &EnsureJreJdk).unwrap();

    assert_eq!(outcome, StepOutcome::Provisioned);
    let lines = session.lines();
    let marker = marker_path("datalab-user", "jre_jdk");
    assert_eq!(lines.last().unwrap(), &format!("touch {}", marker));
    // the install commands precede the marker write
    let touch_pos = lines.len() - 1;
    let install_pos = lines
        .iter()
        .position(|l| l.contains("java-1.8.0-openjdk"))
        .unwrap();
    assert!(install_pos < touch_pos);
    // every command in this step is a root action
    assert!(session.recorded().iter().all(|c| c.sudo));
}

#[test]
fn failed_step_leaves_no_marker() {
    let session = FakeSession::new().fail_on("yum -y install sbt", "No package sbt available");
    let config = test_config(Application::Jupyter);

    let err = run_step(&session, &config, &EnsureSbt).unwrap_err();

    assert!(err.to_string().contains("install sbt"), "{}", err);
    let marker = marker_path("datalab-user", "sbt");
    assert!(
        !session.lines().iter().any(|l| l.contains(&marker)),
        "marker must not be written on failure"
    );
}

#[test]
fn rerun_after_failure_starts_from_the_top() {
    let config = test_config(Application::Jupyter);

    let failing = FakeSession::new().fail_on("apache-maven", "404 Not Found");
    let step = InstallMaven::default();
    run_step(&failing, &config, &step).unwrap_err();

    // a fresh session with no marker runs the full sequence again
    let session = FakeSession::new();
    let outcome = run_step(&session, &config, &step).unwrap();
    assert_eq!(outcome, StepOutcome::Provisioned);
    assert!(session.lines().iter().any(|l| l.contains("wget")));
    assert!(session.lines().iter().any(|l| l.contains("/usr/bin/mvn")));
}

#[test]
fn rstudio_refresh_reapplies_password() {
    let marker = marker_path("datalab-user", "rstudio");
    let session = FakeSession::new().with_existing_path(&marker);
    let config = test_config(Application::Rstudio);
    let step = InstallRstudio {
        local_spark_path: "/opt/spark".to_string(),
        rstudio_pass: "s3cret word".to_string(),
        rstudio_version: "1.1.453".to_string(),
    };

    let outcome = run_step(&session, &config, &step).unwrap();

    assert_eq!(outcome, StepOutcome::AlreadyProvisioned);
    let lines = session.lines();
    assert_eq!(lines.len(), 1, "only the password reset should run");
    assert!(lines[0].contains("chpasswd"));
    // password travels through the quoting layer, not raw interpolation
    assert!(lines[0].contains("'datalab-user:s3cret word'"));
}

#[test]
fn unmarked_step_always_runs() {
    let config = test_config(Application::Jupyter);
    let step = InstallGitlabCert {
        certfile: "gitlab.crt".to_string(),
    };

    for _ in 0..2 {
        let session = FakeSession::new();
        let outcome = run_step(&session, &config, &step).unwrap();
        assert_eq!(outcome, StepOutcome::Provisioned);
        let lines = session.lines();
        assert!(lines.iter().any(|l| l.contains("update-ca-trust")));
        assert!(
            !lines.iter().any(|l| l.contains(".ensure_dir")),
            "markerless steps must not touch the ensure directory"
        );
    }
}

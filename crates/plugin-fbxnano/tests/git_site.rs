//! End-to-end checks against a real git working copy.

use std::{path::Path, process::Command};

use plugin_fbxnano::{
    DeployOutcome, FbxNanoConfig, GitCli, MaintenanceAction, SiteController, SiteError,
    SiteScript,
};
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn git(dir: &Path, args: &[&str], when: u32) {
    let date = format!("{} +0000", 1_700_000_000 + when);
    let status = Command::new("git")
        .args([
            "-c",
            "user.name=fbxnano",
            "-c",
            "user.email=fbxnano@example.org",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "tag.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

/// A repository on `main` with one commit per tag, tagged in order.
fn site_with_tags(tags: &[&str]) -> TempDir {
    site_with_tags_in(&std::env::temp_dir(), tags)
}

fn site_with_tags_in(base: &Path, tags: &[&str]) -> TempDir {
    let dir = tempfile::tempdir_in(base).unwrap();
    git(dir.path(), &["init", "-q", "-b", "main"], 0);
    for (i, tag) in tags.iter().enumerate() {
        let when = u32::try_from(i).unwrap() * 60 + 60;
        std::fs::write(dir.path().join("index.html"), format!("<p>{tag}</p>")).unwrap();
        git(dir.path(), &["add", "index.html"], when);
        git(dir.path(), &["commit", "-q", "-m", tag], when);
        git(dir.path(), &["tag", tag], when);
    }
    dir
}

fn config_for(dir: &Path) -> FbxNanoConfig {
    FbxNanoConfig {
        room_address: String::new(),
        site_path: dir.display().to_string(),
    }
}

fn controller() -> SiteController {
    SiteController::new(GitCli::default(), SiteScript::default())
}

#[tokio::test]
async fn deploy_falls_back_to_v_prefix_and_is_idempotent() {
    if !git_available() {
        eprintln!("git not found; skipping");
        return;
    }
    let site = site_with_tags(&["v1.2.2", "v1.2.3", "v1.3.0"]);
    let cfg = config_for(site.path());
    let site_ctl = controller();
    let cwd = std::env::current_dir().unwrap();

    assert_eq!(site_ctl.current_version(&cfg).await.unwrap(), "main");

    let outcome = site_ctl.deploy(&cfg, "1.2.3").await.unwrap();
    assert_eq!(
        outcome,
        DeployOutcome::Deployed {
            tag: "v1.2.3".to_owned(),
            version: Some("v1.2.3".to_owned()),
        }
    );
    assert_eq!(site_ctl.current_version(&cfg).await.unwrap(), "v1.2.3");

    let again = site_ctl.deploy(&cfg, "1.2.3").await.unwrap();
    assert_eq!(
        again,
        DeployOutcome::AlreadyDeployed {
            version: "v1.2.3".to_owned()
        }
    );
    assert_eq!(std::env::current_dir().unwrap(), cwd);
}

#[tokio::test]
async fn recent_tags_follow_creation_order() {
    if !git_available() {
        return;
    }
    let site = site_with_tags(&["v1", "v2", "v3", "v4", "v5"]);
    let tags = controller()
        .recent_tags(&config_for(site.path()), 3)
        .await
        .unwrap();
    assert_eq!(tags, ["v5", "v4", "v3"]);
}

#[tokio::test]
async fn unknown_tag_leaves_the_checkout_alone() {
    if !git_available() {
        return;
    }
    let site = site_with_tags(&["v1", "v2"]);
    let cfg = config_for(site.path());
    let err = controller().deploy(&cfg, "v9").await.unwrap_err();
    assert_eq!(err, SiteError::TagNotFound("v9".to_owned()));
    assert_eq!(controller().current_version(&cfg).await.unwrap(), "main");
}

#[tokio::test]
async fn failures_do_not_move_the_process_directory() {
    let cwd = std::env::current_dir().unwrap();
    let missing = tempfile::tempdir().unwrap().path().join("nowhere");
    let cfg = config_for(&missing);

    assert_eq!(
        controller().current_version(&cfg).await,
        Err(SiteError::VersionUnavailable)
    );
    assert!(matches!(
        controller().recent_tags(&cfg, 5).await,
        Err(SiteError::VersionControlFailure(_))
    ));
    assert!(matches!(
        controller()
            .maintenance_mode(&cfg, MaintenanceAction::Start)
            .await,
        Err(SiteError::MaintenanceFailure(_))
    ));
    assert_eq!(std::env::current_dir().unwrap(), cwd);
}

#[cfg(unix)]
#[tokio::test]
async fn maintenance_status_relays_script_output() {
    let site = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink("/bin/echo", site.path().join("maintenance_mode")).unwrap();
    let cfg = config_for(site.path());

    let status = controller()
        .maintenance_mode(&cfg, MaintenanceAction::parse("bogus"))
        .await
        .unwrap();
    assert_eq!(status, "status");
    let started = controller()
        .maintenance_mode(&cfg, MaintenanceAction::parse("start"))
        .await
        .unwrap();
    assert_eq!(started, "Maintenance mode started.");
}

/// The site directory's name alone, relative to the test's working directory.
fn relative_to_cwd(site: &TempDir) -> &Path {
    let relative = Path::new(site.path().file_name().unwrap());
    assert!(relative.is_relative());
    relative
}

#[tokio::test]
async fn relative_site_path_works_for_git() {
    if !git_available() {
        return;
    }
    let site = site_with_tags_in(Path::new("."), &["v1", "v2"]);
    let cfg = config_for(relative_to_cwd(&site));
    let cwd = std::env::current_dir().unwrap();

    assert_eq!(controller().current_version(&cfg).await.unwrap(), "main");
    controller().deploy(&cfg, "1").await.unwrap();
    assert_eq!(controller().current_version(&cfg).await.unwrap(), "v1");
    assert_eq!(std::env::current_dir().unwrap(), cwd);
}

#[cfg(unix)]
#[tokio::test]
async fn relative_site_path_works_for_maintenance() {
    let site = tempfile::tempdir_in(".").unwrap();
    std::os::unix::fs::symlink("/bin/echo", site.path().join("maintenance_mode")).unwrap();
    let cfg = config_for(relative_to_cwd(&site));
    let cwd = std::env::current_dir().unwrap();

    let status = controller()
        .maintenance_mode(&cfg, MaintenanceAction::Status)
        .await
        .unwrap();
    assert_eq!(status, "status");
    let stopped = controller()
        .maintenance_mode(&cfg, MaintenanceAction::Stop)
        .await
        .unwrap();
    assert_eq!(stopped, "Maintenance mode stopped.");
    assert_eq!(std::env::current_dir().unwrap(), cwd);
}

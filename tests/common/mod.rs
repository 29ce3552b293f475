//! Shared fixtures: a stand-in extractor written as a shell script.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_test::TestServer;
use reelgrab::config::Config;
use reelgrab::server::{router, AppState};
use tempfile::TempDir;

pub const PUBLIC_BASE: &str = "http://videos.test";

/// Writes ten bytes to the path following `-o`, like a successful download.
pub const WRITES_TEN_BYTES: &str = r#"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done
printf '0123456789' > "$out"
"#;

/// Exits cleanly without producing anything.
pub const WRITES_NOTHING: &str = "exit 0\n";

pub const UNSUPPORTED: &str = r#"
echo "ERROR: Unsupported URL: https://example.com/page" >&2
exit 1
"#;

pub const NOTHING_DOWNLOADABLE: &str = r#"
echo "ERROR: [generic] No downloadable video formats found" >&2
exit 1
"#;

/// Starts a background sleeper, records its pid next to the script and
/// never exits on its own.
pub const HANGS: &str = r#"
sleep 30 &
echo $! > "$(dirname "$0")/child.pid"
wait
"#;

/// Absent, or a zombie waiting for its reaper.
pub fn process_gone(pid: &str) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .map(|rest| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
    }
}

/// Poll until the pid recorded in `pid_file` is gone or `attempts * 50ms` pass.
pub async fn wait_for_exit(pid_file: &Path, attempts: u32) -> (String, bool) {
    let pid = std::fs::read_to_string(pid_file).expect("Failed to read pid file");
    let pid = pid.trim().to_string();

    for _ in 0..attempts {
        if process_gone(&pid) {
            return (pid, true);
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    (pid, false)
}

pub struct TestApp {
    pub server: TestServer,
    pub downloads: PathBuf,
    pub workdir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

/// Config pointing the extractor at `/bin/sh <script>` inside a fresh temp dir.
pub fn config_with_script(workdir: &Path, script: &str, timeout_ms: Option<u64>) -> Config {
    let script_path = workdir.join("extractor.sh");
    std::fs::write(&script_path, script).expect("Failed to write extractor script");

    let downloads = workdir.join("downloads");
    std::fs::create_dir_all(&downloads).expect("Failed to create downloads dir");

    let mut config = Config::default();
    config.server.public_base_url = Some(PUBLIC_BASE.to_string());
    config.storage.downloads_dir = downloads;
    config.extractor.binary_path = "/bin/sh".to_string();
    config.extractor.binary_args = vec![script_path.to_string_lossy().to_string()];
    config.extractor.timeout_override_ms = timeout_ms;
    config
}

pub fn setup_test_app(script: &str) -> TestApp {
    setup_test_app_with_timeout(script, None)
}

pub fn setup_test_app_with_timeout(script: &str, timeout_ms: Option<u64>) -> TestApp {
    setup_test_app_with(script, |config| config.extractor.timeout_override_ms = timeout_ms)
}

/// Like [`setup_test_app`], with a hook to adjust the config before the router is built.
pub fn setup_test_app_with(script: &str, adjust: impl FnOnce(&mut Config)) -> TestApp {
    let workdir = TempDir::new().expect("Failed to create temp dir");
    let mut config = config_with_script(workdir.path(), script, None);
    adjust(&mut config);
    let downloads = config.storage.downloads_dir.clone();

    let app = router(Arc::new(AppState::new(config)));
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        downloads,
        workdir,
    }
}

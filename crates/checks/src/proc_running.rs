use tracing::debug;

use crate::{CheckError, CheckType, Checker, Params, CHECK_PROCESS_RUNNING};

/// Checks that a matching process is running, by scanning `/proc`.
///
/// A process matches when its `exe` symlink contains `path` (if non-empty)
/// and its command line contains `check` (if non-empty).
pub struct ProcessRunning;

#[async_trait::async_trait]
impl Checker for ProcessRunning {
    fn check_type(&self) -> CheckType {
        CHECK_PROCESS_RUNNING.into()
    }

    async fn run(&self, params: &Params) -> Result<(), CheckError> {
        let mut entries = tokio::fs::read_dir("/proc").await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(pid) = name.to_str() else {
                continue;
            };
            if pid.is_empty() || !pid.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }

            // Processes come and go while we scan, unreadable ones are skipped.
            let Ok((exe, cmdline)) = read_exe_and_args(pid).await else {
                continue;
            };

            if !params.path.is_empty() && !exe.contains(&params.path) {
                continue;
            }
            if !params.check.is_empty() && !cmdline.contains(&params.check) {
                continue;
            }

            debug!(pid, exe = %exe, "found requested process");
            return Ok(());
        }

        Err(CheckError::failed("no matching process found"))
    }
}

async fn read_exe_and_args(pid: &str) -> std::io::Result<(String, String)> {
    let exe = tokio::fs::read_link(format!("/proc/{pid}/exe")).await?;
    let raw = tokio::fs::read(format!("/proc/{pid}/cmdline")).await?;

    // Arguments in cmdline are separated by NUL bytes.
    let cmdline = raw
        .split(|&b| b == 0)
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ");

    Ok((exe.to_string_lossy().into_owned(), cmdline))
}

#[cfg(test)]
#[cfg(target_os = "linux")]
mod tests {
    use tokio::process::Command;

    use super::*;

    async fn run_against_sleep(args: &str, params: Params) -> bool {
        let mut tokens = args.split(' ');
        let mut child = Command::new(tokens.next().unwrap())
            .args(tokens)
            .spawn()
            .unwrap();

        let result = ProcessRunning.run(&params).await;
        child.kill().await.unwrap();
        result.is_ok()
    }

    #[tokio::test]
    async fn finds_process_by_path_and_args() {
        let cases = [
            (
                "sleep 1000",
                Params {
                    path: "sleep".to_string(),
                    ..Default::default()
                },
                true,
            ),
            (
                "sleep 1001",
                Params {
                    path: "/bin/lets_hope_it_doesnt_exist".to_string(),
                    ..Default::default()
                },
                false,
            ),
            (
                "sleep 1002",
                Params {
                    check: "999".to_string(),
                    ..Default::default()
                },
                false,
            ),
            (
                "sleep 1003",
                Params {
                    check: "1003".to_string(),
                    ..Default::default()
                },
                true,
            ),
        ];

        for (args, params, found) in cases {
            assert_eq!(
                run_against_sleep(args, params).await,
                found,
                "process {args:?}"
            );
        }
    }
}

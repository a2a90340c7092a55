use std::collections::BTreeMap;
use std::path::Path;

use eyre::{Result, WrapErr};

use checkmesh_checks::Params;

/// Load a JSON checks file: a mapping from check name to its parameters.
/// The mapping key becomes each check's `name`.
pub fn load(path: &Path) -> Result<Vec<Params>> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading checks file {}", path.display()))?;

    let entries: BTreeMap<String, Params> =
        serde_json::from_str(&raw).wrap_err("parsing checks file")?;

    Ok(entries
        .into_iter()
        .map(|(name, mut params)| {
            params.name = name;
            params
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use checkmesh_checks::{CHECK_FILE_CONTAINS, CHECK_FILE_EXISTS};

    use super::*;

    #[test]
    fn keys_become_check_names() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
{
  "check_etc_hosts_has_8888": {
    "path": "/etc/hosts",
    "type": "file_contains",
    "check": "8.8.8.8"
  },
  "check_kite_config_file_exists": {
    "path": "/etc/koding/kite.conf",
    "type": "file_exists"
  },
  "check_nginx_running": {
    "path": "/sbin/init",
    "action": "shutdown -r now"
  }
}
"#,
        )
        .unwrap();

        let params = load(file.path()).unwrap();

        assert_eq!(
            params,
            vec![
                Params {
                    name: "check_etc_hosts_has_8888".to_string(),
                    check_type: CHECK_FILE_CONTAINS.into(),
                    path: "/etc/hosts".to_string(),
                    check: "8.8.8.8".to_string(),
                    ..Default::default()
                },
                Params {
                    name: "check_kite_config_file_exists".to_string(),
                    check_type: CHECK_FILE_EXISTS.into(),
                    path: "/etc/koding/kite.conf".to_string(),
                    ..Default::default()
                },
                Params {
                    name: "check_nginx_running".to_string(),
                    path: "/sbin/init".to_string(),
                    action: "shutdown -r now".to_string(),
                    ..Default::default()
                },
            ]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Path::new("no/such/checks.json")).is_err());
    }
}

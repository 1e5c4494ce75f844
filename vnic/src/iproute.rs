//! Thin wrappers around the `ip`/`dhclient` command line tools.

use std::process::Output;

use tokio::process::Command;

use crate::error::VnicError;

/// Run a command, capturing output. Spawn failures surface as IO errors.
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<Output, VnicError> {
    Ok(Command::new(program).args(args).output().await?)
}

/// Run a command and require a zero exit status.
pub(crate) async fn run_ok(program: &str, args: &[&str]) -> Result<(), String> {
    match Command::new(program).args(args).output().await {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => Err(String::from_utf8_lossy(&out.stderr).trim().to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Run a command where failure is acceptable (cleanup paths).
pub(crate) async fn run_best_effort(program: &str, args: &[&str]) {
    let _ = Command::new(program).args(args).output().await;
}

/// Extract the first IPv4 address from `ip -4 addr show <dev>` output.
///
/// Looks for a line like `    inet 10.0.0.50/24 brd ...` and returns
/// the address without the prefix.
pub(crate) fn parse_inet4(output: &str) -> Option<String> {
    for line in output.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("inet ") {
            let addr = rest.split_whitespace().next()?;
            let addr = addr.split('/').next()?;
            if addr.parse::<std::net::Ipv4Addr>().is_ok() {
                return Some(addr.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inet4() {
        let output = "\
5: vcam4@eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue state UP
    inet 10.0.0.50/24 brd 10.0.0.255 scope global vcam4
       valid_lft forever preferred_lft forever
";
        assert_eq!(parse_inet4(output), Some("10.0.0.50".to_string()));
    }

    #[test]
    fn test_parse_inet4_no_address() {
        let output = "5: vcam4@eth0: <BROADCAST,MULTICAST> mtu 1500 state DOWN\n";
        assert_eq!(parse_inet4(output), None);
    }

    #[test]
    fn test_parse_inet4_skips_garbage() {
        assert_eq!(parse_inet4("    inet not-an-address/24\n"), None);
    }
}

//! Single-instance enforcement (spec.md §4.L: "a single-instance lock
//! is enforced by detecting a concurrent process bound to the same
//! front-end URL"). The teacher's dependency set carries no flock/fs2
//! crate (confirmed against `tools/Cargo.toml`), so this sticks to
//! plain `std::fs` rather than pulling in one just for this: a lock
//! file named after the device URL, holding the owning PID, with
//! liveness checked through `/proc/<pid>` on exit from a previous,
//! uncleanly-terminated run.

use std::fs;
use std::io;
use std::path::PathBuf;

pub struct InstanceLock {
    path: PathBuf,
}

fn lock_path(device_url: &str) -> PathBuf {
    let safe: String = device_url.chars().map(|c| if c.is_ascii_alphanumeric() { c } else { '_' }).collect();
    std::env::temp_dir().join(format!("scu-logd.{safe}.lock"))
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // No portable liveness check off Linux; assume alive so a stale
    // lock never gets silently stolen on platforms we can't probe.
    true
}

impl InstanceLock {
    /// Acquires the lock for `device_url`, or fails if another live
    /// process already holds it.
    pub fn acquire(device_url: &str) -> io::Result<Self> {
        let path = lock_path(device_url);
        match fs::read_to_string(&path) {
            Ok(existing) => {
                if let Ok(pid) = existing.trim().parse::<u32>() {
                    if process_alive(pid) {
                        return Err(io::Error::new(
                            io::ErrorKind::AlreadyExists,
                            format!("scu-logd (pid {pid}) already polling {device_url}"),
                        ));
                    }
                }
                // Stale lock from a process that no longer exists.
                fs::remove_file(&path).ok();
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        fs::remove_file(&self.path).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_the_same_url_fails_while_the_first_is_held() {
        let url = "tcp/test-single-instance-host";
        let _first = InstanceLock::acquire(url).unwrap();
        assert!(InstanceLock::acquire(url).is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let url = "tcp/test-single-instance-drop";
        {
            let _lock = InstanceLock::acquire(url).unwrap();
        }
        let _again = InstanceLock::acquire(url).unwrap();
    }
}

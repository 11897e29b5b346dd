//! # Solver executable and MPI launcher discovery.
//!
//! An explicit override (e.g. a CLI flag) is authoritative: it is used as
//! given and never swapped for a discovered binary, so pre-flight reports a
//! wrong path instead of silently running another solver.
//!
//! Without an override, the search order is:
//! 1. the `COMPLAB_PATH` environment variable;
//! 2. `complab` on `PATH`;
//! 3. the project directory and its usual build folders;
//! 4. per-user and system install locations.
//!
//! The first candidate that exists and is executable wins.
//! [`executable_candidates`] is the pure part of the search and takes the
//! environment as arguments.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Environment variable that overrides auto-discovery.
pub const ENV_EXECUTABLE: &str = "COMPLAB_PATH";

/// Launchers tried when no preferred one is usable.
pub const KNOWN_LAUNCHERS: &[&str] = &["mpirun", "mpiexec", "srun"];

#[cfg(windows)]
/// File name of the solver binary.
pub const EXE_NAME: &str = "complab.exe";
#[cfg(not(windows))]
/// File name of the solver binary.
pub const EXE_NAME: &str = "complab";

/// Whether `path` is a regular file the current user may execute.
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Ordered discovery candidates.
///
/// `on_path` is the result of a `PATH` lookup, `home` the user's home directory.
pub fn executable_candidates(
    env_value: Option<&OsStr>,
    on_path: Option<PathBuf>,
    project_dir: &Path,
    home: Option<&Path>,
) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(v) = env_value.filter(|v| !v.is_empty()) {
        out.push(PathBuf::from(v));
    }
    out.extend(on_path);

    for sub in ["", "build", "Release", "Debug", "bin"] {
        out.push(project_dir.join(sub).join(EXE_NAME));
    }

    if let Some(home) = home {
        #[cfg(windows)]
        out.push(home.join("AppData/Local/CompLaB_Studio/bin").join(EXE_NAME));
        out.push(home.join(".local/bin").join(EXE_NAME));
        out.push(home.join("CompLaB/build").join(EXE_NAME));
    }
    #[cfg(unix)]
    {
        out.push(PathBuf::from("/usr/local/bin").join(EXE_NAME));
        out.push(PathBuf::from("/usr/bin").join(EXE_NAME));
    }

    out.dedup();
    out
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Finds the solver executable for `project_dir`.
///
/// With an override, returns it only if it is executable; discovery is not tried.
pub fn locate_executable(override_path: Option<&Path>, project_dir: &Path) -> Option<PathBuf> {
    if let Some(p) = override_path {
        let ok = is_executable(p);
        debug!(candidate = %p.display(), ok, "executable override");
        return ok.then(|| p.to_path_buf());
    }

    let env_value = env::var_os(ENV_EXECUTABLE);
    let on_path = which::which(EXE_NAME).ok();
    let home = home_dir();

    executable_candidates(
        env_value.as_deref(),
        on_path,
        project_dir,
        home.as_deref(),
    )
    .into_iter()
    .find(|c| {
        let ok = is_executable(c);
        debug!(candidate = %c.display(), ok, "executable candidate");
        ok
    })
}

/// Executable to launch for `project_dir`.
///
/// The override as given when present; otherwise the first discovered
/// candidate, falling back to the bare [`EXE_NAME`]. A path that does not
/// exist is left for pre-flight to report.
pub fn resolve_executable(override_path: Option<&Path>, project_dir: &Path) -> PathBuf {
    match override_path {
        Some(p) => p.to_path_buf(),
        None => locate_executable(None, project_dir).unwrap_or_else(|| PathBuf::from(EXE_NAME)),
    }
}

/// Finds an MPI launcher: `preferred` first, then [`KNOWN_LAUNCHERS`].
pub fn locate_launcher(preferred: Option<&str>) -> Option<PathBuf> {
    if let Some(p) = preferred.map(str::trim).filter(|p| !p.is_empty()) {
        let as_path = Path::new(p);
        if as_path.components().count() > 1 && is_executable(as_path) {
            return Some(as_path.to_path_buf());
        }
        if let Ok(found) = which::which(p) {
            return Some(found);
        }
        debug!(launcher = p, "preferred launcher not found, trying defaults");
    }
    KNOWN_LAUNCHERS
        .iter()
        .find_map(|name| which::which(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_env_then_path_then_project() {
        let project = Path::new("/proj");
        let c = executable_candidates(
            Some(OsStr::new("/env/complab")),
            Some(PathBuf::from("/path/complab")),
            project,
            None,
        );
        assert_eq!(c[0], PathBuf::from("/env/complab"));
        assert_eq!(c[1], PathBuf::from("/path/complab"));
        assert_eq!(c[2], project.join(EXE_NAME));
        assert!(c.contains(&project.join("build").join(EXE_NAME)));
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        let c = executable_candidates(Some(OsStr::new("")), None, Path::new("/p"), None);
        assert!(c.iter().all(|p| !p.as_os_str().is_empty()));
        assert_eq!(c[0], Path::new("/p").join(EXE_NAME));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_executable_needs_mode_bits() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("complab");
        fs::write(&f, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&f, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!is_executable(&f));
        fs::set_permissions(&f, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&f));
        assert!(!is_executable(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_prefers_override() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("my-solver");
        fs::write(&f, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&f, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(locate_executable(Some(f.as_path()), dir.path()), Some(f.clone()));
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_override_is_not_replaced() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir.path().join(EXE_NAME);
        fs::write(&bundled, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&bundled, fs::Permissions::from_mode(0o755)).unwrap();
        let missing = Path::new("/no/such/solver");

        assert_eq!(locate_executable(Some(missing), dir.path()), None);
        assert_eq!(resolve_executable(Some(missing), dir.path()), missing);
        assert_eq!(resolve_executable(None, dir.path()).file_name(), bundled.file_name());
    }

    #[cfg(unix)]
    #[test]
    fn test_launcher_accepts_explicit_path() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("mympirun");
        fs::write(&f, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&f, fs::Permissions::from_mode(0o755)).unwrap();
        let p = f.to_str().unwrap();
        assert_eq!(locate_launcher(Some(p)), Some(f.clone()));
    }
}

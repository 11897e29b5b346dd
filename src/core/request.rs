//! Run request: what to launch and where.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::preflight::Validate;

/// Default solver configuration file name, relative to the working directory.
pub const DEFAULT_XML: &str = "CompLaB.xml";

/// MPI launch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelLaunch {
    /// Launcher program (`mpirun`, `mpiexec`, `srun` or a full path).
    pub launcher_command: String,
    /// Number of ranks; `<= 1` runs the solver directly.
    pub core_count: u32,
}

/// Domain settings needed to validate the geometry file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainSpec {
    /// File name inside `input/`.
    pub geometry_file: String,
    pub nx: u64,
    pub ny: u64,
    pub nz: u64,
    /// Material numbers defined by the project; empty accepts any non-negative value.
    pub materials: Vec<i64>,
}

impl DomainSpec {
    pub fn new(geometry_file: impl Into<String>, nx: u64, ny: u64, nz: u64) -> Self {
        Self {
            geometry_file: geometry_file.into(),
            nx,
            ny,
            nz,
            materials: Vec::new(),
        }
    }

    pub fn with_materials(mut self, materials: impl IntoIterator<Item = i64>) -> Self {
        self.materials = materials.into_iter().collect();
        self
    }
}

/// One solver invocation. Immutable once handed to [`Supervisor::start`](crate::Supervisor::start).
///
/// ```rust
/// use simvisor::{DomainSpec, RunRequest};
///
/// let req = RunRequest::new("/opt/complab/complab", "/home/me/project")
///     .with_parallel("mpirun", 4)
///     .with_domain(DomainSpec::new("geo.dat", 100, 50, 30).with_materials([0, 1, 2]));
///
/// assert!(req.uses_launcher());
/// assert!(req.xml_path().ends_with("CompLaB.xml"));
/// ```
#[derive(Clone)]
pub struct RunRequest {
    pub executable_path: PathBuf,
    pub working_directory: PathBuf,
    /// Solver XML; relative paths resolve against `working_directory`.
    pub xml_config_path: PathBuf,
    pub parallel: Option<ParallelLaunch>,
    pub domain: Option<DomainSpec>,
    /// Extra pre-flight checks, run after the built-in ones.
    pub validators: Vec<Arc<dyn Validate>>,
}

impl fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRequest")
            .field("executable_path", &self.executable_path)
            .field("working_directory", &self.working_directory)
            .field("xml_config_path", &self.xml_config_path)
            .field("parallel", &self.parallel)
            .field("domain", &self.domain)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl RunRequest {
    pub fn new(executable: impl Into<PathBuf>, working_directory: impl Into<PathBuf>) -> Self {
        Self {
            executable_path: executable.into(),
            working_directory: working_directory.into(),
            xml_config_path: PathBuf::from(DEFAULT_XML),
            parallel: None,
            domain: None,
            validators: Vec::new(),
        }
    }

    pub fn with_xml_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.xml_config_path = path.into();
        self
    }

    pub fn with_parallel(mut self, launcher: impl Into<String>, core_count: u32) -> Self {
        self.parallel = Some(ParallelLaunch {
            launcher_command: launcher.into(),
            core_count,
        });
        self
    }

    pub fn with_domain(mut self, domain: DomainSpec) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_validator(mut self, v: Arc<dyn Validate>) -> Self {
        self.validators.push(v);
        self
    }

    /// Whether the command line is prefixed by an MPI launcher.
    pub fn uses_launcher(&self) -> bool {
        self.parallel.as_ref().is_some_and(|p| p.core_count > 1)
    }

    /// Absolute (or working-directory-based) XML path.
    pub fn xml_path(&self) -> PathBuf {
        self.working_directory.join(&self.xml_config_path)
    }

    /// XML argument passed to the solver: relative to the working directory when possible.
    pub fn xml_argument(&self) -> PathBuf {
        let full = self.xml_path();
        match full.strip_prefix(&self.working_directory) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => full,
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.working_directory.join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.working_directory.join("output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_defaults_to_working_dir() {
        let req = RunRequest::new("/bin/complab", "/proj");
        assert_eq!(req.xml_path(), PathBuf::from("/proj/CompLaB.xml"));
        assert_eq!(req.xml_argument(), PathBuf::from("CompLaB.xml"));
    }

    #[test]
    fn test_xml_outside_working_dir_stays_absolute() {
        let req = RunRequest::new("/bin/complab", "/proj").with_xml_config("/elsewhere/run.xml");
        assert_eq!(req.xml_path(), PathBuf::from("/elsewhere/run.xml"));
        assert_eq!(req.xml_argument(), PathBuf::from("/elsewhere/run.xml"));
    }

    #[test]
    fn test_single_core_does_not_use_launcher() {
        let req = RunRequest::new("/bin/complab", "/proj").with_parallel("mpirun", 1);
        assert!(!req.uses_launcher());
        assert!(req.with_parallel("mpirun", 2).uses_launcher());
    }
}

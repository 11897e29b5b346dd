//! # Exit-code classification.
//!
//! [`classify`] maps a solver exit code to a category, a description and a
//! remediation list. It is pure, total and idempotent.
//!
//! ## Sign conventions
//! Windows structured-exception codes are `u32` values (`0xC0000005`), but
//! process APIs report them either as the unsigned value (`3221225477`) or as
//! the signed 32-bit reinterpretation (`-1073741819`). POSIX signals arrive as
//! `-signal`.
//! The table is keyed by the signed 32-bit form. Codes in `[2^31, 2^32)` are
//! looked up as `code - 2^32`, so both representations hit the same entry.
//! Codes outside the 32-bit range are never folded back into it and classify
//! as unknown.
//!
//! ```rust
//! use simvisor::diagnose::{ExitCategory, classify};
//!
//! assert_eq!(classify(-1073741819).category(), ExitCategory::AccessViolation);
//! assert_eq!(classify(3221225477).category(), ExitCategory::AccessViolation);
//! assert_eq!(classify(0).category(), ExitCategory::Success);
//! assert_eq!(classify(1 << 32).category(), ExitCategory::Unknown);
//! assert!(!classify(4242).suggestions().is_empty());
//! ```

use std::fmt;

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCategory {
    Success,
    Configuration,
    FileNotFound,
    InvalidParameter,
    Abort,
    Killed,
    SegmentationFault,
    HeapCorruption,
    AccessViolation,
    StackOverflow,
    DllNotFound,
    DivideByZero,
    Unknown,
}

impl ExitCategory {
    /// Returns a short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExitCategory::Success => "success",
            ExitCategory::Configuration => "configuration",
            ExitCategory::FileNotFound => "file_not_found",
            ExitCategory::InvalidParameter => "invalid_parameter",
            ExitCategory::Abort => "abort",
            ExitCategory::Killed => "killed",
            ExitCategory::SegmentationFault => "segmentation_fault",
            ExitCategory::HeapCorruption => "heap_corruption",
            ExitCategory::AccessViolation => "access_violation",
            ExitCategory::StackOverflow => "stack_overflow",
            ExitCategory::DllNotFound => "dll_not_found",
            ExitCategory::DivideByZero => "divide_by_zero",
            ExitCategory::Unknown => "unknown",
        }
    }

    /// Memory faults are usually a geometry/domain dimension mismatch.
    pub fn is_memory_fault(&self) -> bool {
        matches!(
            self,
            ExitCategory::SegmentationFault
                | ExitCategory::HeapCorruption
                | ExitCategory::AccessViolation
                | ExitCategory::StackOverflow
        )
    }
}

/// One row of the exit-code table.
#[derive(Debug, PartialEq, Eq)]
pub struct ExitCodeInfo {
    /// Signed 32-bit code.
    pub code: i32,
    pub category: ExitCategory,
    /// Display title, e.g. `"Access Violation (0xC0000005)"`.
    pub title: &'static str,
    pub description: &'static str,
    /// Remediation steps, most likely fix first.
    pub suggestions: &'static [&'static str],
}

const GEOMETRY_FIRST: &str =
    "Check first that the geometry .dat file holds exactly nx * ny * nz values for the configured domain.";

static EXIT_CODES: &[ExitCodeInfo] = &[
    ExitCodeInfo {
        code: 0,
        category: ExitCategory::Success,
        title: "Success",
        description: "Simulation completed normally.",
        suggestions: &[],
    },
    ExitCodeInfo {
        code: 1,
        category: ExitCategory::Configuration,
        title: "Configuration / File Error",
        description: "The solver reported a configuration error or could not find a required file.",
        suggestions: &[
            "Check the console output for a specific error message (e.g. 'could not open geometry file').",
            "Verify the geometry .dat file exists inside the input/ folder.",
            "Make sure the geometry filename in the domain settings matches the file on disk.",
            "Ensure input_path and output_path in CompLaB.xml are correct relative paths.",
        ],
    },
    ExitCodeInfo {
        code: 2,
        category: ExitCategory::FileNotFound,
        title: "File Not Found",
        description: "A required file could not be opened.",
        suggestions: &[
            "Check the console output for the exact filename.",
            "Verify the file exists in the project's input/ directory.",
            "Check file permissions; the file may be locked by another program.",
        ],
    },
    ExitCodeInfo {
        code: -1,
        category: ExitCategory::InvalidParameter,
        title: "Invalid Parameter / ADE Error",
        description: "A computed parameter is out of range (e.g. ADE tau invalid).",
        suggestions: &[
            "Check that the Peclet number and pressure drop produce a valid tau (0.5 < tau < 2).",
            "Reduce the Peclet number or adjust delta_P.",
            "Verify diffusion coefficients are physically reasonable.",
        ],
    },
    ExitCodeInfo {
        code: -6,
        category: ExitCategory::Abort,
        title: "Abort (SIGABRT)",
        description: "The solver aborted, possibly on a failed assertion.",
        suggestions: &[
            GEOMETRY_FIRST,
            "Check the console output for the assertion or error message printed before the abort.",
            "Save the project again to regenerate CompLaB.xml.",
        ],
    },
    ExitCodeInfo {
        code: -9,
        category: ExitCategory::Killed,
        title: "Killed (SIGKILL)",
        description: "The process was killed, possibly by the out-of-memory killer.",
        suggestions: &[
            "Reduce the domain size (nx, ny, nz) or close other programs to free memory.",
            "For large domains, use MPI parallelism to distribute memory.",
        ],
    },
    ExitCodeInfo {
        code: -11,
        category: ExitCategory::SegmentationFault,
        title: "Segmentation Fault (SIGSEGV)",
        description: "The solver accessed invalid memory.",
        suggestions: &[
            GEOMETRY_FIRST,
            "Check for corrupt or truncated geometry files.",
            "Verify material numbers in the geometry file match the project settings.",
        ],
    },
    ExitCodeInfo {
        code: -1073740940,
        category: ExitCategory::HeapCorruption,
        title: "Heap Corruption (0xC0000374)",
        description: "The solver wrote past the end of an array; almost always a geometry size mismatch.",
        suggestions: &[
            GEOMETRY_FIRST,
            "Count the values in the geometry file, then set nx, ny, nz to match.",
            "Do not include ghost-node padding; the solver adds it internally.",
            "Try the sample geometry.dat with its documented dimensions to isolate the issue.",
        ],
    },
    ExitCodeInfo {
        code: -1073741819,
        category: ExitCategory::AccessViolation,
        title: "Access Violation (0xC0000005)",
        description: "The solver tried to read or write invalid memory.",
        suggestions: &[
            GEOMETRY_FIRST,
            "Verify the geometry file contains only integer values (0, 1, 2, 3, ...).",
            "Make sure there are no non-numeric characters in the geometry file.",
            "Check that material numbers in the geometry file match the project settings.",
        ],
    },
    ExitCodeInfo {
        code: -1073741571,
        category: ExitCategory::StackOverflow,
        title: "Stack Overflow (0xC00000FD)",
        description: "The solver ran out of stack memory; the domain may be too large.",
        suggestions: &[
            GEOMETRY_FIRST,
            "Reduce the domain size (nx, ny, nz) and try again.",
            "Close other programs to free memory.",
            "For large domains, use MPI parallelism to distribute memory.",
        ],
    },
    ExitCodeInfo {
        code: -1073741515,
        category: ExitCategory::DllNotFound,
        title: "DLL Not Found (0xC0000135)",
        description: "A required DLL library could not be found.",
        suggestions: &[
            "Keep the CompLaB executable and its DLLs in the same folder.",
            "Reinstall the CompLaB solver package.",
            "Check that the Visual C++ Redistributable is installed.",
        ],
    },
    ExitCodeInfo {
        code: -1073741676,
        category: ExitCategory::DivideByZero,
        title: "Integer Divide by Zero (0xC0000094)",
        description: "The solver attempted to divide by zero.",
        suggestions: &[
            "Check that the domain dimensions (nx, ny, nz) are all > 0.",
            "Verify the Peclet number is not zero if reactive transport is enabled.",
            "Ensure at least one substrate is defined if chemistry is enabled.",
        ],
    },
];

static UNKNOWN: ExitCodeInfo = ExitCodeInfo {
    code: 0,
    category: ExitCategory::Unknown,
    title: "Unknown Error",
    description: "The solver exited with an unrecognized code. Check the console output for clues.",
    suggestions: &[
        "Run the solver from the command line in the project directory for more detail.",
        "Look for error messages in the solver output.",
        "Verify all input files exist and have the correct format.",
        "Try the sample geometry and default settings to isolate the issue.",
    ],
};

/// Signed 32-bit form of a reported code.
///
/// `None` for codes neither `i32` nor `u32` can hold.
#[inline]
pub fn to_signed32(code: i64) -> Option<i32> {
    i32::try_from(code)
        .ok()
        .or_else(|| u32::try_from(code).ok().map(|unsigned| unsigned as i32))
}

/// Direct table lookup by signed 32-bit code.
pub fn lookup(code: i32) -> Option<&'static ExitCodeInfo> {
    EXIT_CODES.iter().find(|info| info.code == code)
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Code as reported.
    pub exit_code: i64,
    /// Table row (or the unknown-code fallback).
    pub info: &'static ExitCodeInfo,
}

impl Classification {
    pub fn category(&self) -> ExitCategory {
        self.info.category
    }

    pub fn title(&self) -> &'static str {
        self.info.title
    }

    pub fn description(&self) -> &'static str {
        self.info.description
    }

    pub fn suggestions(&self) -> &'static [&'static str] {
        self.info.suggestions
    }

    pub fn is_success(&self) -> bool {
        self.info.category == ExitCategory::Success
    }

    /// Hex form (`0xC0000005`) for 32-bit codes outside the small signed range.
    pub fn hex(&self) -> Option<String> {
        if (-255..=i64::from(i32::MAX)).contains(&self.exit_code) {
            return None;
        }
        to_signed32(self.exit_code).map(|v| format!("0x{:08X}", v as u32))
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (exit code {}", self.title(), self.exit_code)?;
        if let Some(hex) = self.hex() {
            write!(f, ", {hex}")?;
        }
        f.write_str(")")
    }
}

/// Classifies an exit code. Never fails; unknown codes get a fallback row.
pub fn classify(exit_code: i64) -> Classification {
    let info = to_signed32(exit_code).and_then(lookup).unwrap_or(&UNKNOWN);
    Classification { exit_code, info }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_success() {
        let c = classify(0);
        assert!(c.is_success());
        assert!(c.suggestions().is_empty());
        assert_eq!(c.hex(), None);
    }

    #[test]
    fn signed_and_unsigned_windows_codes_agree() {
        let pairs = [
            (-1073740940_i64, 0xC0000374_i64),
            (-1073741819, 0xC0000005),
            (-1073741571, 0xC00000FD),
            (-1073741515, 0xC0000135),
            (-1073741676, 0xC0000094),
        ];
        for (signed, unsigned) in pairs {
            assert_eq!(classify(signed).info, classify(unsigned).info);
            assert_ne!(classify(signed).category(), ExitCategory::Unknown);
        }
    }

    #[test]
    fn access_violation_is_stable() {
        let first = classify(-1073741819);
        let _ = classify(1);
        let _ = classify(123456);
        let again = classify(-1073741819);
        assert_eq!(first, again);
        assert_eq!(first.category(), ExitCategory::AccessViolation);
        assert_eq!(first.hex().as_deref(), Some("0xC0000005"));
    }

    #[test]
    fn memory_faults_suggest_geometry_first() {
        for code in [-1073740940_i64, -1073741819, -1073741571, -11] {
            let c = classify(code);
            assert!(c.category().is_memory_fault());
            assert!(c.suggestions()[0].contains("nx * ny * nz"), "code {code}");
        }
    }

    #[test]
    fn unknown_codes_fall_back() {
        for code in [3_i64, 77, -200, 4242, 0x1_0000_0007] {
            let c = classify(code);
            assert_eq!(c.category(), ExitCategory::Unknown, "code {code}");
            assert!(c.suggestions().iter().any(|s| s.contains("command line")));
        }
    }

    #[test]
    fn out_of_range_codes_are_not_folded() {
        assert_eq!(to_signed32(0xC000_0005), Some(-1073741819));
        assert_eq!(to_signed32(-1073741819), Some(-1073741819));
        assert_eq!(to_signed32(1 << 32), None);
        assert_eq!(to_signed32(-(1 << 32)), None);
        for code in [1_i64 << 32, (1 << 32) + 0xC000_0005, -(1 << 32)] {
            let c = classify(code);
            assert_eq!(c.category(), ExitCategory::Unknown, "code {code}");
            assert!(!c.is_success());
            assert_eq!(c.hex(), None);
        }
    }

    #[test]
    fn posix_signals_are_known() {
        assert_eq!(classify(-11).category(), ExitCategory::SegmentationFault);
        assert_eq!(classify(-9).category(), ExitCategory::Killed);
        assert_eq!(classify(-6).category(), ExitCategory::Abort);
    }

    #[test]
    fn table_codes_are_unique() {
        for (i, a) in EXIT_CODES.iter().enumerate() {
            for b in &EXIT_CODES[i + 1..] {
                assert_ne!(a.code, b.code);
            }
        }
    }
}

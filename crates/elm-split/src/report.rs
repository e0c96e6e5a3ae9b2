//! Run reports, as pretty JSON or as human-readable lines

use std::{fmt::Write as _, path::Path};

use serde::Serialize;

use crate::orchestrator::{SplitOutcome, SplitResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportResult {
    SplitProgramsOneShared,
    SingleProgramReduced,
    Error,
}

impl From<SplitOutcome> for ReportResult {
    fn from(outcome: SplitOutcome) -> Self {
        match outcome {
            SplitOutcome::SplitProgramsOneShared => Self::SplitProgramsOneShared,
            SplitOutcome::SingleProgramReduced => Self::SingleProgramReduced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputReport {
    pub file: String,
    pub sizes: Sizes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sizes {
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputReport {
    pub dry_run: bool,
    pub files: Vec<FileReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: String,
    /// `None` for the shared module
    pub program: Option<String>,
    pub bytes: usize,
}

/// Everything one run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub result: ReportResult,
    pub input: InputReport,
    pub programs: Vec<String>,
    pub output: OutputReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Report {
    /// Report for a finished split; `out_dir` prefixes the module paths
    pub fn success(
        input: &Path,
        input_bytes: usize,
        result: &SplitResult,
        out_dir: &Path,
        dry_run: bool,
    ) -> Self {
        let files = result
            .modules
            .iter()
            .map(|module| FileReport {
                path: out_dir.join(&module.file_name).display().to_string(),
                program: module.program.clone(),
                bytes: module.contents.len(),
            })
            .collect();
        Self {
            result: result.outcome.into(),
            input: InputReport {
                file: input.display().to_string(),
                sizes: Sizes { bytes: input_bytes },
            },
            programs: result.programs.clone(),
            output: OutputReport { dry_run, files },
            error: None,
        }
    }

    /// Report for a failed run
    pub fn failure(input: &Path, input_bytes: usize, dry_run: bool, error: &anyhow::Error) -> Self {
        Self {
            result: ReportResult::Error,
            input: InputReport {
                file: input.display().to_string(),
                sizes: Sizes { bytes: input_bytes },
            },
            programs: Vec::new(),
            output: OutputReport {
                dry_run,
                files: Vec::new(),
            },
            error: Some(format!("{error:#}")),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_human(&self) -> String {
        let mut out = String::new();
        if let Some(error) = &self.error {
            let _ = writeln!(out, "error: {error}");
            return out;
        }

        let _ = writeln!(
            out,
            "{} ({} bytes): {} program(s)",
            self.input.file,
            self.input.sizes.bytes,
            self.programs.len()
        );
        let verb = if self.output.dry_run {
            "would write"
        } else {
            "wrote"
        };
        for file in &self.output.files {
            let _ = writeln!(
                out,
                "  {verb} {} ({} bytes){}",
                file.path,
                file.bytes,
                file.program
                    .as_ref()
                    .map_or_else(|| " [shared]".to_owned(), |program| format!(" [{program}]"))
            );
        }
        out
    }
}

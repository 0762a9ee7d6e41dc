//! Interpretation of ClamAV command-line output.
//!
//! `clamscan` and `clamdscan` share an exit-code convention and a report
//! format:
//!
//! ```text
//! /tmp/scan-x/3f0c...tmp: Eicar-Test-Signature FOUND
//! /tmp/scan-x/9a1b...tmp: OK
//! ```

use crate::backends::process::ProcessOutput;
use crate::core::ScanError;

/// Marker ClamAV appends to every infected line.
pub const FOUND_MARKER: &str = "FOUND";

/// Exit code for a completed scan with no detections.
pub const EXIT_CLEAN: i32 = 0;

/// Exit code for a completed scan with at least one detection.
pub const EXIT_INFECTED: i32 = 1;

/// Extracts the bare file names of infected files from scanner output.
///
/// Only lines whose verdict carries the `FOUND` marker count; anything
/// printed after the marker is ignored. Order is preserved.
pub fn parse_infected(stdout: &str) -> Vec<String> {
    stdout.lines().filter_map(infected_name).collect()
}

fn infected_name(line: &str) -> Option<String> {
    let line = line.trim();
    let (verdict, rest) = line.rsplit_once(FOUND_MARKER)?;
    if rest.starts_with(|c: char| c.is_alphanumeric()) {
        return None;
    }
    let (path, signature) = verdict.strip_suffix(' ')?.rsplit_once(": ")?;
    if signature.trim().is_empty() {
        return None;
    }
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    (!name.is_empty()).then(|| name.to_string())
}

/// Maps a finished scanner process onto the scan contract.
pub fn interpret(program: &str, output: &ProcessOutput) -> Result<Vec<String>, ScanError> {
    match output.exit_code {
        Some(EXIT_CLEAN) => Ok(Vec::new()),
        Some(EXIT_INFECTED) => {
            let infected = parse_infected(&output.stdout);
            if infected.is_empty() {
                return Err(ScanError::internal(format!(
                    "{program} reported infections but no FOUND lines were parsed"
                )));
            }
            Ok(infected)
        }
        exit_code => Err(ScanError::ScannerFailed {
            program: program.to_string(),
            exit_code,
            stderr: output.stderr.trim().to_string(),
        }),
    }
}

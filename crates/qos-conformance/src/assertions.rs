//! Outcome checks with observed-vs-expected detail in every failure.

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AssertionFailure {
    #[error("Received {observed} messages from pub, which is not in expected range {min}-{max}")]
    CountOutOfRange { observed: u32, min: u32, max: u32 },

    #[error("Echo CLI printed no output")]
    NoOutput,

    #[error("Echo CLI did not print expected message `{expected}` ({captured} lines captured)")]
    MissingLine { expected: String, captured: usize },

    #[error(
        "Echo CLI should not have received anything with incompatible QoS, got {} lines (first: `{}`)",
        .lines.len(),
        .lines.first().map_or("", String::as_str)
    )]
    UnexpectedOutput { lines: Vec<String> },
}

/// Checks `min <= observed <= max`.
///
/// # Errors
/// Returns [`AssertionFailure::CountOutOfRange`] carrying all three values.
pub fn assert_count_in_range(observed: u32, min: u32, max: u32) -> Result<(), AssertionFailure> {
    if (min..=max).contains(&observed) {
        Ok(())
    } else {
        Err(AssertionFailure::CountOutOfRange { observed, min, max })
    }
}

/// Checks captured echo output against the compatibility expectation.
///
/// When compatible, the output must be non-empty and contain `expected_line`
/// exactly as one of its lines. When incompatible, nothing may be captured.
///
/// # Errors
/// Returns the failure naming the violated condition.
pub fn assert_echo_output(
    lines: &[String],
    compatible: bool,
    expected_line: &str,
) -> Result<(), AssertionFailure> {
    if compatible {
        if lines.is_empty() {
            return Err(AssertionFailure::NoOutput);
        }
        if !lines.iter().any(|line| line == expected_line) {
            return Err(AssertionFailure::MissingLine {
                expected: expected_line.to_owned(),
                captured: lines.len(),
            });
        }
        Ok(())
    } else if lines.is_empty() {
        Ok(())
    } else {
        Err(AssertionFailure::UnexpectedOutput {
            lines: lines.to_vec(),
        })
    }
}

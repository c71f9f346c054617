//! Human review of candidate codes.
//!
//! A [`ValidationSet`] pairs every candidate with a selection flag. Only
//! the reviewer changes flags; the set is never fed back to the agent.
//! Selected rows can be exported as CSV or JSON for the target system.

use std::io::Write;

use serde::Serialize;

use super::candidate::CodeCandidate;
use super::request::TargetSystem;
use crate::error::ValidationError;

/// A candidate and whether the reviewer kept it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationState {
    /// The suggested code.
    pub candidate: CodeCandidate,
    /// Reviewer decision.
    pub selected: bool,
}

/// Review state for one analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationSet {
    rows: Vec<ValidationState>,
}

/// Summary shown before sending validated codes.
#[derive(Debug, Clone, Serialize)]
pub struct Recap<'a> {
    /// Destination system.
    pub target: TargetSystem,
    /// Selected candidates, in review order.
    pub codes: Vec<&'a CodeCandidate>,
    /// Candidates left unselected.
    pub rejected: usize,
}

impl ValidationSet {
    /// Creates a set with every row unselected.
    #[must_use]
    pub fn new(candidates: Vec<CodeCandidate>) -> Self {
        Self {
            rows: candidates
                .into_iter()
                .map(|candidate| ValidationState {
                    candidate,
                    selected: false,
                })
                .collect(),
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in review order.
    #[must_use]
    pub fn rows(&self) -> &[ValidationState] {
        &self.rows
    }

    /// Flips the selection of row `index` and returns the new value.
    pub fn toggle(&mut self, index: usize) -> Result<bool, ValidationError> {
        let row = self.row_mut(index)?;
        row.selected = !row.selected;
        Ok(row.selected)
    }

    /// Sets the selection of row `index`.
    pub fn set(&mut self, index: usize, selected: bool) -> Result<(), ValidationError> {
        self.row_mut(index)?.selected = selected;
        Ok(())
    }

    /// Selects or clears every row.
    pub fn set_all(&mut self, selected: bool) {
        for row in &mut self.rows {
            row.selected = selected;
        }
    }

    /// Applies a selection expression.
    ///
    /// Accepts `all`, `none`, or a comma-separated list of 1-based rows and
    /// inclusive ranges (`1,3-5`). Listed rows are selected, others cleared.
    pub fn apply_selection(&mut self, expr: &str) -> Result<(), ValidationError> {
        let expr = expr.trim();
        match expr.to_lowercase().as_str() {
            "all" | "*" => {
                self.set_all(true);
                return Ok(());
            }
            "none" | "" => {
                self.set_all(false);
                return Ok(());
            }
            _ => {}
        }

        let mut picks = Vec::new();
        for part in expr.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (start, end) = match part.split_once('-') {
                Some((a, b)) => (parse_row(expr, a)?, parse_row(expr, b)?),
                None => {
                    let n = parse_row(expr, part)?;
                    (n, n)
                }
            };
            if start > end {
                return Err(ValidationError::InvalidSelection {
                    input: expr.to_string(),
                    message: format!("range {start}-{end} is reversed"),
                });
            }
            for n in start..=end {
                if n > self.rows.len() {
                    return Err(ValidationError::OutOfRange {
                        index: n - 1,
                        len: self.rows.len(),
                    });
                }
                picks.push(n - 1);
            }
        }

        self.set_all(false);
        for index in picks {
            self.rows[index].selected = true;
        }
        Ok(())
    }

    /// Selected candidates in review order.
    pub fn selected(&self) -> impl Iterator<Item = &CodeCandidate> {
        self.rows
            .iter()
            .filter(|r| r.selected)
            .map(|r| &r.candidate)
    }

    /// Builds the pre-send summary.
    #[must_use]
    pub fn recap(&self, target: TargetSystem) -> Recap<'_> {
        let codes: Vec<_> = self.selected().collect();
        let rejected = self.rows.len() - codes.len();
        Recap {
            target,
            codes,
            rejected,
        }
    }

    /// Writes selected rows as CSV with a header line.
    ///
    /// The header is written even when nothing is selected. Returns the
    /// number of data rows written.
    pub fn export_csv<W: Write>(
        &self,
        out: W,
        target: TargetSystem,
    ) -> Result<usize, ValidationError> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(["target", "code", "description", "extract", "url"])?;
        let mut written = 0;
        for c in self.selected() {
            writer.write_record([
                target.name(),
                c.code.as_str(),
                c.description.as_str(),
                c.extract.as_deref().unwrap_or(""),
                c.url.as_ref().map_or("", url::Url::as_str),
            ])?;
            written += 1;
        }
        writer.flush()?;
        Ok(written)
    }

    /// Writes the recap as pretty JSON.
    pub fn export_json<W: Write>(
        &self,
        mut out: W,
        target: TargetSystem,
    ) -> Result<usize, ValidationError> {
        let recap = self.recap(target);
        serde_json::to_writer_pretty(&mut out, &recap)?;
        writeln!(out)?;
        out.flush()?;
        Ok(recap.codes.len())
    }

    fn row_mut(&mut self, index: usize) -> Result<&mut ValidationState, ValidationError> {
        let len = self.rows.len();
        self.rows
            .get_mut(index)
            .ok_or(ValidationError::OutOfRange { index, len })
    }
}

fn parse_row(expr: &str, raw: &str) -> Result<usize, ValidationError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ValidationError::InvalidSelection {
            input: expr.to_string(),
            message: format!("{raw:?} is not a row number (rows start at 1)"),
        }),
    }
}

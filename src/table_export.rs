//! CSV export of assembled result tables.

use crate::error::RanovaError;
use crate::statistics_table::StatisticKind;
use crate::test_result::{TestResult, TestStatistic};
use std::path::Path;

/// Summary of one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub columns: Vec<String>,
}

/// Write one contrast of a test's statistics to CSV, one row per probeset.
///
/// Only statistics the engine actually computed become columns. Rows are
/// assembled all-or-nothing (see [`TestResult::probeset_row`]); probesets
/// with any absent cell are skipped and counted, never written partially.
pub fn export_statistics(
    test: &TestResult,
    statistic: TestStatistic,
    contrast_index: usize,
    path: &Path,
) -> Result<ExportReport, RanovaError> {
    // Without a known source experiment every row would be skipped for a
    // missing probeset ID; refuse up front instead of writing a bare header.
    if test.data().is_none() {
        return Err(RanovaError::Evaluation(format!(
            "'{}' has no known source experiment; associate one before exporting",
            test.accessor()
        )));
    }
    let table = test.statistics(statistic)?.ok_or_else(|| {
        RanovaError::Evaluation(format!(
            "'{}' has no {} statistics to export",
            test.accessor(),
            statistic.component_name()
        ))
    })?;

    let mut kinds = Vec::new();
    for kind in StatisticKind::ALL {
        if table.has_statistic(kind)? {
            kinds.push(kind);
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| RanovaError::Transport(format!("could not open '{}': {e}", path.display())))?;
    let mut header = vec!["probeset".to_string()];
    header.extend(kinds.iter().map(|k| k.label().to_string()));
    writer
        .write_record(&header)
        .map_err(|e| RanovaError::Transport(format!("could not write CSV header: {e}")))?;

    let mut rows_written = 0;
    let mut rows_skipped = 0;
    for probe_index in 0..table.row_count()? {
        match test.probeset_row(probe_index, contrast_index, statistic, &kinds)? {
            Some(row) => {
                let mut record = vec![row.probeset_id];
                record.extend(row.values.iter().map(|v| v.to_string()));
                writer.write_record(&record).map_err(|e| {
                    RanovaError::Transport(format!("could not write CSV row: {e}"))
                })?;
                rows_written += 1;
            }
            None => rows_skipped += 1,
        }
    }
    writer
        .flush()
        .map_err(|e| RanovaError::Transport(format!("could not flush CSV output: {e}")))?;

    Ok(ExportReport {
        rows_written,
        rows_skipped,
        columns: header,
    })
}

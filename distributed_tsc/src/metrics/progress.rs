//! Learner progress CSVs.
//!
//! Three files per run, one row per sample, one column per agent:
//!
//! ```text
//! <progress_dir>/<controller>_<stamp>_updates.csv
//! <progress_dir>/<controller>_<stamp>_replay.csv
//! <progress_dir>/<controller>_<stamp>_available.csv
//! ```

use crate::core::{AgentId, SharedState};
use crate::error::Result;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Quantity tracked by one progress file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressColumn {
    /// Training steps taken.
    Updates,
    /// Trajectories held in the replay.
    Replay,
    /// Unconsumed experience credit.
    Available,
}

impl ProgressColumn {
    pub const ALL: [ProgressColumn; 3] = [
        ProgressColumn::Updates,
        ProgressColumn::Replay,
        ProgressColumn::Available,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProgressColumn::Updates => "updates",
            ProgressColumn::Replay => "replay",
            ProgressColumn::Available => "available",
        }
    }

    fn value(self, shared: &SharedState, id: &AgentId) -> i64 {
        match self {
            ProgressColumn::Updates => shared.stats(id).map_or(0, |s| s.updates() as i64),
            ProgressColumn::Replay => shared.replay(id).map_or(0, |r| r.len() as i64),
            ProgressColumn::Available => shared.stats(id).map_or(0, |s| s.available_experience()),
        }
    }
}

/// Wall-clock stamp used in file names and rows.
pub fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Writer of the three progress CSVs.
pub struct ProgressWriter {
    files: Vec<(ProgressColumn, PathBuf, BufWriter<File>)>,
    agents: Vec<AgentId>,
}

impl ProgressWriter {
    /// Create the files and write their headers. Agent columns are sorted.
    pub fn create(dir: &Path, controller: &str, agents: &[AgentId]) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let mut agents = agents.to_vec();
        agents.sort();
        let stamp = timestamp();

        let header = std::iter::once("stamp")
            .chain(agents.iter().map(AgentId::as_str))
            .collect::<Vec<_>>()
            .join(",");

        let mut files = Vec::with_capacity(ProgressColumn::ALL.len());
        for column in ProgressColumn::ALL {
            let path = dir.join(format!("{controller}_{stamp}_{}.csv", column.as_str()));
            let mut writer = BufWriter::new(File::create(&path)?);
            writeln!(writer, "{header}")?;
            files.push((column, path, writer));
        }
        Ok(Self { files, agents })
    }

    pub fn path(&self, column: ProgressColumn) -> Option<&Path> {
        self.files
            .iter()
            .find(|(c, _, _)| *c == column)
            .map(|(_, p, _)| p.as_path())
    }

    /// Append one sample of every agent to every file.
    pub fn write_row(&mut self, shared: &SharedState) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        for (column, _, writer) in &mut self.files {
            let mut row = format!("{now:.3}");
            for id in &self.agents {
                row.push(',');
                row.push_str(&column.value(shared, id).to_string());
            }
            writeln!(writer, "{row}")?;
            writer.flush()?;
        }
        Ok(())
    }
}

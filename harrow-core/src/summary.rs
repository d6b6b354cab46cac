// Human-readable wrap-up of a finished run.

use crate::run::RunOutcome;
use chrono::Local;

pub struct RunSummary {
    pub finished_at: String,
    pub headless: bool,
    pub pages_visited: usize,
    pub duration_secs: f64,
    pub data_bytes: usize,
    pub outputs: Vec<String>,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn from_outcome(outcome: &RunOutcome, headless: bool) -> Self {
        let data_bytes = serde_json::to_string(&outcome.report.data)
            .map(|s| s.len())
            .unwrap_or(0);

        RunSummary {
            finished_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            headless,
            pages_visited: outcome.report.pages_visited,
            duration_secs: outcome.report.duration.as_secs_f64(),
            data_bytes,
            outputs: outcome
                .written
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            error: outcome.report.error.as_ref().map(|e| e.to_string()),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Finished at:    {}\n", self.finished_at));
        out.push_str(&format!(
            "Mode:           {}\n",
            if self.headless { "headless" } else { "visible" }
        ));
        out.push_str(&format!("Pages visited:  {}\n", self.pages_visited));
        out.push_str(&format!(
            "Duration:       {}\n",
            format_seconds(self.duration_secs)
        ));
        out.push_str(&format!(
            "Data collected: {}\n",
            format_size(self.data_bytes)
        ));

        if self.outputs.is_empty() {
            out.push_str("Outputs:        none configured\n");
        } else {
            out.push_str(&format!("Outputs:        {}\n", self.outputs.join(", ")));
        }
        if let Some(error) = &self.error {
            out.push_str(&format!("Aborted:        {}\n", error));
        }

        out
    }
}

pub fn format_seconds(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let minutes = (secs / 60.0).floor() as u64;
        format!("{}m {:.0}s", minutes, secs % 60.0)
    }
}

pub fn format_size(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

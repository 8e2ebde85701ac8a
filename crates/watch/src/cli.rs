use clap::Parser;
use shorts_core::types::ExecutionId;

/// Follow a video pipeline run from the terminal.
#[derive(Parser, Debug)]
#[command(name = "shorts-watch", version)]
pub struct Args {
    /// Backend HTTP base URL. Overrides `SHORTS_API_URL`.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Topic for a new run. The backend researches one when omitted.
    #[arg(long, short = 't', conflicts_with = "id")]
    pub topic: Option<String>,

    /// JSON object of configuration overrides for a new run.
    #[arg(long, conflicts_with = "id")]
    pub overrides: Option<String>,

    /// Watch an existing run instead of submitting a new one.
    #[arg(long)]
    pub id: Option<ExecutionId>,

    /// Print the backend health report and exit.
    #[arg(long, action)]
    pub check: bool,
}

impl Args {
    /// Parsed `--overrides`, if given. Must be a JSON object.
    pub fn config_overrides(&self) -> anyhow::Result<Option<serde_json::Value>> {
        let Some(raw) = &self.overrides else {
            return Ok(None);
        };
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("--overrides is not valid JSON: {e}"))?;
        if !value.is_object() {
            anyhow::bail!("--overrides must be a JSON object");
        }
        Ok(Some(value))
    }
}

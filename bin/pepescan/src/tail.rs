use feed::{FeedHandle, FeedSnapshot, HistoryState};
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct TailArgs {
    /// Number of rows printed per update
    #[clap(short, long, default_value = "20")]
    limit: usize,
}

impl TailArgs {
    pub async fn exec(&self, feed: FeedHandle) -> anyhow::Result<()> {
        let mut updates = feed.watch();
        loop {
            let snapshot = updates.borrow_and_update().clone();
            print!("{}", render(&snapshot, self.limit));

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    return Ok(());
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn render(snapshot: &FeedSnapshot, limit: usize) -> String {
    let mut out = String::from("\x1B[2J\x1B[H");
    let history = match &snapshot.history {
        HistoryState::Loading => "loading history".to_string(),
        HistoryState::Loaded { transfers } => format!("{} historical", transfers),
        HistoryState::Failed { reason } => format!("history unavailable: {}", reason),
    };
    out.push_str(&format!(
        "{} of {} transfers, {} pending, {}{}\n",
        snapshot.rows.len(),
        snapshot.total,
        snapshot.pending,
        history,
        if snapshot.stale { ", live updates paused" } else { "" }
    ));
    out.push_str(&format!(
        "{:<66}  {:<42}  {:<42}  {:>28}  {}\n",
        "Hash", "From", "To", "Quantity", "Age"
    ));
    for row in snapshot.rows.iter().take(limit) {
        out.push_str(&format!(
            "{:<66}  {:<42}  {:<42}  {:>28}  {}\n",
            row.transaction_hash, row.sender, row.recipient, row.amount, row.age
        ));
    }
    out
}

//! HTML listing of every stored metric.

use std::fmt::Write;

use axum::extract::State;
use axum::response::Html;
use tally_core::models::metric::Snapshot;

use crate::error::ApiError;
use crate::AppState;

/// GET /
pub async fn list_metrics(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let snapshot = state.backend.get_metrics().await?;
    Ok(Html(render(&snapshot)))
}

fn render(snapshot: &Snapshot) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>tally</title></head><body>\n",
    );

    html.push_str("<h2>Gauges</h2>\n<table>\n");
    for (name, value) in &snapshot.gauges {
        let _ = writeln!(html, "<tr><td>{}</td><td>{value}</td></tr>", escape(name));
    }
    html.push_str("</table>\n<h2>Counters</h2>\n<table>\n");
    for (name, delta) in &snapshot.counters {
        let _ = writeln!(html, "<tr><td>{}</td><td>{delta}</td></tr>", escape(name));
    }
    html.push_str("</table>\n</body></html>\n");
    html
}

/// Metric names come straight from request paths.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lists_gauges_and_counters() {
        let html = render(
            &Snapshot::new()
                .with_gauge("Alloc", 3407240.0)
                .with_counter("PollCount", 1),
        );
        assert!(html.contains("<td>Alloc</td><td>3407240</td>"));
        assert!(html.contains("<td>PollCount</td><td>1</td>"));
    }

    #[test]
    fn names_are_escaped() {
        let html = render(&Snapshot::new().with_gauge("<script>", 1.0));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}

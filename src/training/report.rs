//! End-of-run report rendering
//!
//! Renders the completed loss and accuracy curves as a two-panel console
//! chart. Kept out of the training loop so the loop stays free of
//! presentation concerns.

use crate::training::metrics::TrainingHistory;

const PLOT_WIDTH: usize = 44;
const PLOT_HEIGHT: usize = 12;
const LABEL_WIDTH: usize = 9;
const PANEL_WIDTH: usize = LABEL_WIDTH + 2 + PLOT_WIDTH;

/// Render training-vs-validation loss and accuracy curves side by side
pub fn render(history: &TrainingHistory) -> String {
    if history.is_empty() {
        return "(no completed epochs)".to_string();
    }

    let loss = panel(
        "Training vs validation loss",
        &history.train_losses,
        &history.val_losses,
    );
    let accuracy = panel(
        "Training vs validation accuracy",
        &history.train_accuracies,
        &history.val_accuracies,
    );

    loss.iter()
        .zip(&accuracy)
        .map(|(left, right)| format!("{:<width$}    {}", left, right, width = PANEL_WIDTH))
        .collect::<Vec<_>>()
        .join("\n")
}

fn panel(title: &str, train: &[f64], val: &[f64]) -> Vec<String> {
    let n = train.len();

    let all = train.iter().chain(val.iter());
    let min = all.clone().cloned().fold(f64::INFINITY, f64::min);
    let max = all.cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = (max - min).max(1e-9);

    let mut grid = vec![vec![' '; PLOT_WIDTH]; PLOT_HEIGHT];
    draw_series(&mut grid, train, min, span, '*');
    draw_series(&mut grid, val, min, span, '+');

    let mut lines = Vec::with_capacity(PLOT_HEIGHT + 3);
    lines.push(format!("{:label$}  {}", "", title, label = LABEL_WIDTH));

    for (row_idx, row) in grid.iter().enumerate() {
        let label = if row_idx == 0 {
            format!("{:>width$.3}", max, width = LABEL_WIDTH)
        } else if row_idx == PLOT_HEIGHT - 1 {
            format!("{:>width$.3}", min, width = LABEL_WIDTH)
        } else {
            " ".repeat(LABEL_WIDTH)
        };
        lines.push(format!("{} |{}", label, row.iter().collect::<String>()));
    }

    lines.push(format!(
        "{:label$} +{}",
        "",
        "-".repeat(PLOT_WIDTH),
        label = LABEL_WIDTH
    ));
    lines.push(format!(
        "{:label$}  * train   + validation   ({} epochs)",
        "",
        n,
        label = LABEL_WIDTH
    ));

    lines
}

fn draw_series(grid: &mut [Vec<char>], series: &[f64], min: f64, span: f64, glyph: char) {
    let n = series.len();
    for (i, &value) in series.iter().enumerate() {
        let col = if n == 1 {
            0
        } else {
            i * (PLOT_WIDTH - 1) / (n - 1)
        };
        let frac = ((value - min) / span).clamp(0.0, 1.0);
        let row = PLOT_HEIGHT - 1 - (frac * (PLOT_HEIGHT - 1) as f64).round() as usize;

        let cell = grid[row][col];
        grid[row][col] = if cell == ' ' || cell == glyph { glyph } else { '#' };
    }
}

use std::fmt::Write;

use crate::trainer::History;

const TRAIN_MARK: char = '*';
const VAL_MARK: char = 'o';
const BOTH_MARK: char = '#';
const LABEL_WIDTH: usize = 9;

/// Courbes de précision et de perte en ASCII.
///
/// Two stacked charts, each `height` rows by `width` columns, training in
/// `*`, validation in `o`, `#` where they overlap.
///
/// # Example
/// ```
/// use gr_train::History;
/// use gr_train::report::render_history;
/// let history = History {
///     loss: vec![1.2, 0.8, 0.5],
///     accuracy: vec![0.4, 0.6, 0.8],
///     val_loss: vec![1.3, 1.0, 0.9],
///     val_accuracy: vec![0.35, 0.5, 0.6],
/// };
/// let chart = render_history(&history, 30, 8);
/// assert!(chart.contains("Accuracy"));
/// assert!(chart.contains("Loss"));
/// ```
#[must_use]
pub fn render_history(history: &History, width: usize, height: usize) -> String {
    let mut out = render_chart("Accuracy", &history.accuracy, &history.val_accuracy, width, height);
    out.push('\n');
    out.push_str(&render_chart("Loss", &history.loss, &history.val_loss, width, height));
    out
}

fn render_chart(title: &str, train: &[f32], validation: &[f32], width: usize, height: usize) -> String {
    let width = width.max(2);
    let height = height.max(2);
    let range = train
        .iter()
        .chain(validation)
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f32, f32)>, v| {
            Some(acc.map_or((v, v), |(lo, hi)| (lo.min(v), hi.max(v))))
        });
    let Some((lo, hi)) = range else {
        return format!("{title} : aucune donnée\n");
    };
    let span = if hi > lo { hi - lo } else { 1.0 };

    let mut grid = vec![vec![' '; width]; height];
    for (series, mark) in [(train, TRAIN_MARK), (validation, VAL_MARK)] {
        if series.is_empty() {
            continue;
        }
        for col in 0..width {
            let idx = col * (series.len() - 1) / (width - 1);
            let v = series[idx];
            if !v.is_finite() {
                continue;
            }
            let row = (((hi - v) / span) * (height - 1) as f32).round() as usize;
            let cell = &mut grid[row.min(height - 1)][col];
            *cell = if *cell == ' ' || *cell == mark { mark } else { BOTH_MARK };
        }
    }

    let epochs = train.len().max(validation.len());
    let mut out = format!("{title} ({TRAIN_MARK} train, {VAL_MARK} validation, {epochs} epochs)\n");
    for (r, row) in grid.iter().enumerate() {
        let label = if r == 0 {
            format!("{hi:>8.4}")
        } else if r == height - 1 {
            format!("{lo:>8.4}")
        } else {
            String::new()
        };
        let line: String = row.iter().collect();
        let _ = writeln!(out, "{label:>LABEL_WIDTH$}|{}", line.trim_end());
    }
    let _ = writeln!(out, "{:>LABEL_WIDTH$}+{}", "", "-".repeat(width));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(n: usize) -> History {
        History {
            loss: (0..n).map(|i| 2.0 / (i + 1) as f32).collect(),
            accuracy: (0..n).map(|i| i as f32 / n as f32).collect(),
            val_loss: (0..n).map(|i| 2.2 / (i + 1) as f32).collect(),
            val_accuracy: (0..n).map(|i| 0.9 * i as f32 / n as f32).collect(),
        }
    }

    #[test]
    fn chart_has_requested_height() {
        let out = render_chart("Loss", &[1.0, 0.5], &[1.1, 0.7], 20, 6);
        // Title, rows, axis.
        assert_eq!(out.lines().count(), 6 + 2);
        assert!(out.lines().last().unwrap().ends_with(&"-".repeat(20)));
    }

    #[test]
    fn extremes_land_on_top_and_bottom_rows() {
        let out = render_chart("Accuracy", &[0.0, 1.0], &[], 10, 5);
        let rows: Vec<&str> = out.lines().skip(1).take(5).collect();
        assert!(rows[0].contains("1.0000") && rows[0].ends_with(TRAIN_MARK));
        assert!(rows[4].contains("0.0000") && rows[4].contains(&format!("|{TRAIN_MARK}")));
    }

    #[test]
    fn overlap_is_marked() {
        let out = render_chart("Loss", &[1.0, 1.0], &[1.0, 1.0], 8, 3);
        assert!(out.contains(BOTH_MARK));
        assert!(!out.lines().skip(1).any(|l| l.contains(VAL_MARK)));
    }

    #[test]
    fn empty_history_renders_placeholder() {
        let out = render_history(&History::default(), 40, 10);
        assert!(out.contains("Accuracy : aucune donnée"));
        assert!(out.contains("Loss : aucune donnée"));
    }

    #[test]
    fn single_epoch_and_tiny_sizes_do_not_panic() {
        let out = render_history(&history(1), 0, 0);
        assert!(out.contains("1 epochs"));
        let out = render_history(&history(30), 120, 12);
        assert!(out.lines().count() > 24);
    }
}

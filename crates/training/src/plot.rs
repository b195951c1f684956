//! Per-epoch loss curves rendered to SVG.

use anyhow::Context;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

const SIZE: (u32, u32) = (750, 450);
/// Segments the last-epoch marker is split into; every other one is drawn.
const MARKER_SEGMENTS: usize = 16;

/// Axis ranges; both start at 0 and the y range leaves headroom above the largest loss.
pub fn axis_ranges(train: &[f64], test: &[f64]) -> (Range<f64>, Range<f64>) {
    let epochs = train.len().max(test.len());
    let x_max = epochs.saturating_sub(1).max(1) as f64;
    let y_max = train
        .iter()
        .chain(test)
        .copied()
        .filter(|v| v.is_finite())
        .fold(0.0, f64::max);
    let y_max = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };
    (0.0..x_max, 0.0..y_max)
}

fn points(values: &[f64]) -> impl Iterator<Item = (f64, f64)> + '_ {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(e, &v)| (e as f64, v))
}

/// Draw training (blue) and testing (red) loss against epoch as an SVG document.
///
/// The last epoch gets a dashed black line up to its test loss, labelled with
/// that loss to one decimal.
pub fn plot_losses(train: &[f64], test: &[f64]) -> anyhow::Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, SIZE).into_drawing_area();
        root.fill(&WHITE)
            .map_err(|e| anyhow::anyhow!("backend error: {e}"))?;

        let (x_range, y_range) = axis_ranges(train, test);
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(x_range, y_range)
            .map_err(|e| anyhow::anyhow!("chart build error: {e}"))?;

        chart
            .configure_mesh()
            .x_desc("Epochs")
            .y_desc("Loss")
            .draw()
            .map_err(|e| anyhow::anyhow!("mesh error: {e}"))?;

        chart
            .draw_series(LineSeries::new(points(train), &BLUE))
            .map_err(|e| anyhow::anyhow!("draw error: {e}"))?
            .label("Training loss")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
        chart
            .draw_series(LineSeries::new(points(test), &RED))
            .map_err(|e| anyhow::anyhow!("draw error: {e}"))?
            .label("Testing loss")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

        if let Some(&last) = test.last().filter(|v| v.is_finite()) {
            let epoch = (test.len() - 1) as f64;
            let step = last / MARKER_SEGMENTS as f64;
            chart
                .draw_series((0..MARKER_SEGMENTS).step_by(2).map(|i| {
                    PathElement::new(
                        vec![(epoch, step * i as f64), (epoch, step * (i + 1) as f64)],
                        &BLACK,
                    )
                }))
                .map_err(|e| anyhow::anyhow!("draw error: {e}"))?;
            chart
                .draw_series(std::iter::once(Text::new(
                    format!("{last:.1}"),
                    (epoch, last),
                    ("sans-serif", 15).into_font().color(&BLACK),
                )))
                .map_err(|e| anyhow::anyhow!("draw error: {e}"))?;
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()
            .map_err(|e| anyhow::anyhow!("legend error: {e}"))?;

        root.present()
            .map_err(|e| anyhow::anyhow!("render error: {e}"))?;
    }
    Ok(svg)
}

/// Render the loss curves to `path`, replacing any earlier plot.
pub fn render_loss_plot(path: &Path, train: &[f64], test: &[f64]) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
    }
    let svg = plot_losses(train, test)?;
    std::fs::write(path, svg).with_context(|| format!("writing loss plot {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_start_at_zero() {
        let (x, y) = axis_ranges(&[3.0, 2.0, 1.5], &[3.2, 2.5, 2.4]);
        assert_eq!(x, 0.0..2.0);
        assert_eq!(y.start, 0.0);
        assert!(y.end > 3.2);

        let (x, y) = axis_ranges(&[], &[]);
        assert_eq!(x, 0.0..1.0);
        assert_eq!(y, 0.0..1.0);
    }

    #[test]
    fn curves_are_labelled_and_last_loss_annotated() {
        let svg = plot_losses(&[3.0, 2.0, 1.5], &[3.2, 2.5, 2.4]).unwrap();
        assert!(svg.contains("<svg"));
        for label in ["Epochs", "Loss", "Training loss", "Testing loss", "2.4"] {
            assert!(svg.contains(label), "missing {label:?}");
        }
        assert!(svg.contains("<polyline"));
    }

    #[test]
    fn empty_history_still_renders_axes_and_legend() {
        let svg = plot_losses(&[], &[]).unwrap();
        assert!(svg.contains("Epochs"));
        assert!(svg.contains("Training loss"));
    }

    #[test]
    fn plot_file_is_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out/loss.svg");
        render_loss_plot(&path, &[1.0], &[2.0]).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        render_loss_plot(&path, &[1.0, 0.5], &[2.0, 1.0]).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();
        assert!(second.contains("<svg"));
        assert_ne!(first, second);
        assert_eq!(second, plot_losses(&[1.0, 0.5], &[2.0, 1.0]).unwrap());
    }
}

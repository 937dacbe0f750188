// Example usage: open or synthesize a signal, stream a few frames, redraw

use sigtrace::utils::conf_helper::{get_cached_config, init_config};
use sigtrace::{
    FormatCode, HeaderOverrides, LogScale, Mode, PlotState, Rect, SignalFile, TraceStyle,
};
use tracing::{debug, info, Level};

fn tone(n: usize, cycles: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(n * 2);
    for i in 0..n {
        let phase = std::f64::consts::TAU * cycles * i as f64 / n as f64;
        out.push(phase.cos());
        out.push(phase.sin());
    }
    out
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    // usage: render_trace [signal-file] [config.json]
    let mut args = std::env::args().skip(1);
    let file_arg = args.next();
    let config = match args.next() {
        Some(path) => init_config(path)?,
        None => get_cached_config(),
    };

    let file = match file_arg {
        Some(path) => SignalFile::open_path(path)?,
        None => {
            let ov = HeaderOverrides {
                format: Some(FormatCode::new("CF")?),
                xdelta: Some(1e-3),
                ..Default::default()
            };
            SignalFile::from_samples(&ov, &tone(4096, 16.0))?
        }
    };
    let header = file.header().clone();
    info!(
        "Signal: format={} atoms={} x=[{}, {}] {}",
        header.format,
        header.size,
        header.x_domain().0,
        header.x_domain().1,
        header.xunits_label().1
    );

    let mut state = PlotState::new(config.clone());
    let recorded = state.attach("recorded", file, TraceStyle::Connected)?;

    let live_header = HeaderOverrides {
        format: Some(FormatCode::new("SD")?),
        xdelta: header.xdelta.into(),
        ..Default::default()
    };
    let live = state.attach(
        "live",
        SignalFile::pipe(&live_header, 8 * 1024)?,
        TraceStyle::Staircase,
    )?;

    let (x0, x1) = header.x_domain();
    let view = Rect::new(x0, -1.5, x0 + (x1 - x0) / 4.0, 1.5);
    let pixel = Rect::new(0.0, 0.0, 800.0, 600.0);

    for frame_no in 0..4 {
        let chunk: Vec<f64> = (0..256)
            .map(|i| ((frame_no * 256 + i) as f64 * 0.05).sin())
            .collect();
        if let Some(layer) = state.layer_mut(&live) {
            layer.window.push(&chunk)?;
        }

        let frame = state.redraw(view, pixel)?;
        for (name, trace) in &frame.traces {
            debug!(
                "frame {} {}: {} segments, {} points, filled={}",
                frame_no,
                name,
                trace.segments.len(),
                trace.point_count(),
                trace.filled
            );
        }
        if let Some((lo, hi)) = frame.context.y_range() {
            info!("frame {}: autoscale y=[{:.3}, {:.3}]", frame_no, lo, hi);
        }
    }

    if let Some(layer) = state.layer_mut(&recorded) {
        layer.window.set_mode(Mode::Log10(LogScale::Twenty));
    }
    let frame = state.redraw(view, pixel)?;
    info!(
        "log view: {:?} (units {:?})",
        frame.context.y_range(),
        Mode::Log10(LogScale::Twenty).y_units()
    );

    Ok(())
}

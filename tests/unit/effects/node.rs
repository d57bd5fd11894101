use super::*;
use crate::effects::background::BackgroundStyle;
use crate::effects::config::BackgroundConfig;
use crate::foundation::color::ColorDef;
use crate::render::composite::BlendMode;

fn style() -> EffectNode {
    let cfg = BackgroundConfig {
        color: ColorDef::rgb8(255, 0, 0),
        ..BackgroundConfig::default()
    };
    EffectNode::Style(StyleNode::Background(BackgroundStyle::new(&cfg).unwrap()))
}

fn params_with_window(window: Vec<f32>, t: f64) -> AudioVisualParameters {
    AudioVisualParameters {
        time_domain: window.into(),
        current_time: t,
        ..AudioVisualParameters::default()
    }
}

fn run_data(node: &mut DataNode, params: &AudioVisualParameters) -> Vec<f32> {
    let mut layer = Layer::new(Canvas::new(1, 1)).unwrap();
    let mut ctx = NodeContext {
        params,
        canvas: Canvas::new(1, 1),
        bars: Vec::new(),
        level: 0.0,
        layer: &mut layer,
        anchor: None,
        composite: Composite::default(),
    };
    node.process(&mut ctx);
    ctx.bars
}

#[test]
fn chain_rejects_out_of_order_or_incomplete_stages() {
    assert!(
        NodeChain::new(vec![
            EffectNode::Blend(BlendNode),
            style(),
            EffectNode::Transform(TransformNode::identity()),
        ])
        .is_err()
    );
    assert!(NodeChain::new(vec![style()]).is_err());
    assert!(
        NodeChain::new(vec![
            style(),
            style(),
            EffectNode::Transform(TransformNode::identity())
        ])
        .is_err()
    );
    assert!(NodeChain::new(vec![EffectNode::Transform(TransformNode::identity())]).is_err());

    let chain = NodeChain::new(vec![
        style(),
        EffectNode::Blend(BlendNode),
        EffectNode::Transform(TransformNode::identity()),
    ])
    .unwrap();
    assert_eq!(
        chain.stages(),
        vec![NodeStage::Style, NodeStage::Blend, NodeStage::Transform]
    );
}

#[test]
fn chain_presents_style_output() {
    let mut chain = NodeChain::new(vec![
        style(),
        EffectNode::Blend(BlendNode),
        EffectNode::Transform(TransformNode::identity()),
    ])
    .unwrap();
    let mut surface = Surface::new(Canvas::new(4, 3)).unwrap();
    chain
        .process(&AudioVisualParameters::silent(0.0), &mut surface)
        .unwrap();
    assert_eq!(surface.pixel(3, 2), Some([255, 0, 0, 255]));
}

#[test]
fn zero_sized_target_is_a_silent_no_op() {
    let mut chain = NodeChain::new(vec![style(), EffectNode::Transform(TransformNode::identity())])
        .unwrap();
    let mut surface = Surface::new(Canvas::new(0, 0)).unwrap();
    chain
        .process(&AudioVisualParameters::silent(0.0), &mut surface)
        .unwrap();
    assert!(surface.data().is_empty());
}

#[test]
fn blend_node_reads_target_draw_state() {
    let mut chain = NodeChain::new(vec![
        style(),
        EffectNode::Blend(BlendNode),
        EffectNode::Transform(TransformNode::identity()),
    ])
    .unwrap();
    let mut surface = Surface::new(Canvas::new(1, 1)).unwrap();
    surface.set_global_alpha(0.0);
    chain
        .process(&AudioVisualParameters::silent(0.0), &mut surface)
        .unwrap();
    assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 0]));

    surface.set_global_alpha(1.0);
    surface.set_blend_mode(BlendMode::Multiply);
    surface.clear(crate::foundation::core::Rgba8Premul::from_straight_rgba(
        255, 255, 255, 255,
    ));
    chain
        .process(&AudioVisualParameters::silent(0.0), &mut surface)
        .unwrap();
    assert_eq!(surface.pixel(0, 0), Some([255, 0, 0, 255]));
}

#[test]
fn realtime_bars_take_window_peaks_with_temporal_smoothing() {
    let mut node = DataNode::new(
        4,
        1.0,
        0.5,
        BarSource::Realtime {
            previous: Vec::new(),
        },
    );
    let mut window = vec![0.0f32; 64];
    window[0] = 0.8;
    window[20] = -0.4;
    let bars = run_data(&mut node, &params_with_window(window, 0.0));
    assert_eq!(bars, vec![0.8, 0.4, 0.0, 0.0]);

    let bars = run_data(&mut node, &params_with_window(vec![0.0; 64], 0.1));
    assert!((bars[0] - 0.4).abs() < 1e-6);
    assert!((bars[1] - 0.2).abs() < 1e-6);
}

#[test]
fn realtime_bars_are_amplified_and_clamped() {
    let mut node = DataNode::new(
        2,
        4.0,
        0.0,
        BarSource::Realtime {
            previous: Vec::new(),
        },
    );
    let bars = run_data(&mut node, &params_with_window(vec![0.1, 0.1, 0.5, 0.5], 0.0));
    assert!((bars[0] - 0.4).abs() < 1e-6);
    assert_eq!(bars[1], 1.0);

    let bars = run_data(&mut node, &AudioVisualParameters::silent(0.0));
    assert_eq!(bars, vec![0.0, 0.0]);
}

#[test]
fn offline_bars_index_summary_by_time() {
    let summary = WaveformSummary {
        peaks: (0..10).map(|i| i as f32 / 10.0).collect(),
        rms: vec![0.0; 10],
    };
    assert_eq!(offline_window(&summary, 5.0, 10.0, 3), vec![0.4, 0.5, 0.6]);
    assert_eq!(offline_window(&summary, 0.0, 10.0, 3), vec![0.0, 0.0, 0.1]);
    assert_eq!(offline_window(&summary, 5.0, 0.0, 2), vec![0.0, 0.0]);

    let mut node = DataNode::new(
        3,
        1.0,
        0.0,
        BarSource::Offline {
            summary: Arc::new(summary),
            duration_secs: 10.0,
        },
    );
    assert!(node.is_offline());
    let bars = run_data(&mut node, &AudioVisualParameters::silent(9.99));
    assert_eq!(bars, vec![0.8, 0.9, 0.0]);
}

#[test]
fn spatial_smoothing_averages_neighbours() {
    let out = smooth_spatial(&[0.0, 1.0, 0.0], 0.5);
    assert_eq!(out, vec![0.25, 0.5, 0.25]);
    assert_eq!(smooth_spatial(&[0.3, 0.7], 0.5), vec![0.3, 0.7]);
}

#[test]
fn transform_rotates_about_anchor() {
    let mut layer = Layer::new(Canvas::new(4, 4)).unwrap();
    layer
        .paint(|rc| {
            rc.set_paint(vello_cpu::peniko::Color::from_rgba8(0, 255, 0, 255));
            rc.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, 2.0, 2.0));
            Ok(())
        })
        .unwrap();
    let params = AudioVisualParameters::silent(0.0);
    let mut ctx = NodeContext {
        params: &params,
        canvas: Canvas::new(4, 4),
        bars: Vec::new(),
        level: 0.0,
        layer: &mut layer,
        anchor: Some(Point::new(2.0, 2.0)),
        composite: Composite::default(),
    };
    let mut surface = Surface::new(Canvas::new(4, 4)).unwrap();
    TransformNode::rotate(180.0)
        .process(&mut ctx, &mut surface)
        .unwrap();
    assert_eq!(surface.pixel(0, 0).unwrap()[3], 0);
    let px = surface.pixel(3, 3).unwrap();
    assert!(px[1] > 200 && px[3] > 200, "{px:?}");
}

//! Integration tests for queue sharing between engines.

use std::sync::Arc;

use frameflow_engine::{
    Context, EngineError, FramedEngine, GraphicsEngineCreateInfo, QueueSharing,
    SurfaceSwapchainFactory,
};
use frameflow_rhi::headless::{HeadlessBackend, HeadlessEvent};
use frameflow_rhi::{QueueCaps, QueueFamily, vk};

const COMPUTE: QueueCaps = QueueCaps {
    present: false,
    graphics: false,
    compute: true,
    transfer: true,
};

/// A present-capable graphics family with one queue and a dedicated compute
/// family with two.
fn split_device() -> Arc<HeadlessBackend> {
    Arc::new(HeadlessBackend::new(vec![
        QueueFamily {
            index: 0,
            caps: QueueCaps {
                present: true,
                graphics: true,
                compute: true,
                transfer: true,
            },
            queue_count: 1,
        },
        QueueFamily {
            index: 1,
            caps: COMPUTE,
            queue_count: 2,
        },
    ]))
}

#[test]
fn test_compute_engines_prefer_dedicated_family() {
    let context = Context::new(split_device());

    let first = FramedEngine::create(&context, COMPUTE, 2).unwrap();
    let second = FramedEngine::create(&context, COMPUTE, 2).unwrap();
    assert_eq!(first.base().queue().family(), 1);
    assert_eq!(second.base().queue().family(), 1);
    assert_ne!(first.base().queue().index(), second.base().queue().index());

    // The dedicated family is full, so the universal family takes the next one.
    let third = FramedEngine::create(&context, COMPUTE, 2).unwrap();
    assert_eq!(third.base().queue().family(), 0);
    assert_eq!(context.claimed_queue_count(), 3);
    assert!(!third.base().queue().is_guarded());
}

#[test]
fn test_engines_share_queue_when_device_is_exhausted() {
    let context = Context::new(split_device());

    let graphics = FramedEngine::create(&context, QueueCaps::PRESENT_GRAPHICS, 2).unwrap();
    let other = FramedEngine::create(&context, QueueCaps::PRESENT_GRAPHICS, 2).unwrap();
    assert!(Arc::ptr_eq(graphics.base().queue(), other.base().queue()));
    assert_eq!(context.queue_sharing(0, 0), Some(QueueSharing::Shared(2)));
    assert!(graphics.base().queue().is_guarded());

    drop(other);
    assert_eq!(context.queue_sharing(0, 0), Some(QueueSharing::Exclusive));
    assert!(!graphics.base().queue().is_guarded());

    drop(graphics);
    assert_eq!(context.queue_sharing(0, 0), None);
    assert_eq!(context.claimed_queue_count(), 0);
}

#[test]
fn test_unsatisfiable_request_is_exhaustion() {
    let context = Context::new(Arc::new(HeadlessBackend::new(vec![QueueFamily {
        index: 0,
        caps: COMPUTE,
        queue_count: 4,
    }])));

    let result = FramedEngine::create(&context, QueueCaps::PRESENT_GRAPHICS, 2);
    assert!(matches!(result, Err(EngineError::ResourceExhaustion(_))));
    assert_eq!(context.claimed_queue_count(), 0);
}

#[test]
fn test_two_windows_present_through_one_queue() {
    let backend = Arc::new(HeadlessBackend::universal(1));
    let context = Context::new(backend.clone());
    let extent = vk::Extent2D {
        width: 640,
        height: 480,
    };
    let mut engines: Vec<_> = (0..2)
        .map(|_| {
            let factory = Arc::new(SurfaceSwapchainFactory::new(
                backend.create_surface(extent),
                extent,
            ));
            context
                .create_graphics_engine(GraphicsEngineCreateInfo::<HeadlessBackend>::new(factory))
                .unwrap()
        })
        .collect();
    assert_eq!(context.queue_sharing(0, 0), Some(QueueSharing::Shared(2)));

    backend.take_events();
    for _ in 0..3 {
        for engine in &mut engines {
            assert!(engine.render_frame(|_frame| Ok(())).unwrap().is_presented());
        }
    }

    let events = backend.take_events();
    let submits = events
        .iter()
        .filter(|e| matches!(e, HeadlessEvent::Submitted { family: 0, index: 0, .. }))
        .count();
    let presents = events
        .iter()
        .filter(|e| matches!(e, HeadlessEvent::Presented { .. }))
        .count();
    assert_eq!(submits, 6);
    assert_eq!(presents, 6);

    drop(engines);
    assert_eq!(context.claimed_queue_count(), 0);
}

//! Integration tests for primitive lifetimes across frame slots.

use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use frameflow_engine::policies::{HostBuffer, HostBufferCow, HostBufferSwap};
use frameflow_engine::primitive::{
    Completion, CompletionSignal, CowAllocator, CowPrimitive, SwapPrimitive,
};
use frameflow_engine::{
    Context, EngineBase, EngineResult, FramedEngine, GraphicsEngineCreateInfo, Primitive,
    PrimitiveCell, SurfaceSwapchainFactory,
};
use frameflow_rhi::headless::HeadlessBackend;
use frameflow_rhi::{BufferUsage, QueueCaps, vk};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct Tint {
    rgba: [f32; 4],
}

impl Tint {
    fn grey(level: f32) -> Self {
        Self {
            rgba: [level, level, level, 1.0],
        }
    }
}

type TintBuffer = HostBuffer<HeadlessBackend, Tint>;

fn framed(frames: usize) -> FramedEngine<HeadlessBackend> {
    let context = Context::new(Arc::new(HeadlessBackend::universal(1)));
    FramedEngine::create(&context, QueueCaps::UNIVERSAL, frames).expect("Failed to create engine")
}

fn cycle(engine: &mut FramedEngine<HeadlessBackend>, uses: &[Arc<PrimitiveCell<TintBuffer>>]) {
    let slot = engine.begin_current_slot().unwrap();
    for cell in uses {
        slot.use_primitive(cell);
    }
    engine.end_and_advance().unwrap();
}

#[test]
fn test_replaced_version_lives_until_slot_reuse() {
    let mut engine = framed(2);
    let cow = CowPrimitive::new(
        engine.base().clone(),
        HostBufferCow::<Tint>::new(BufferUsage::Uniform),
    );

    cow.reset(Tint::grey(0.25)).run().unwrap();
    let first = cow.get().unwrap();
    let first_weak: Weak<PrimitiveCell<TintBuffer>> = Arc::downgrade(&first);

    // Slot 0 records work reading the first version.
    cycle(&mut engine, &[first]);
    cow.reset(Tint::grey(0.75)).run().unwrap();
    assert!(
        first_weak.upgrade().is_some(),
        "Slot 0 still holds the replaced version"
    );

    // Slot 1, then slot 0 again: the version was used during slot 0's
    // previous occupancy, so it survives this visit.
    cycle(&mut engine, &[]);
    cycle(&mut engine, &[]);
    assert!(first_weak.upgrade().is_some());

    // Slot 0's previous occupancy did not use it anymore.
    cycle(&mut engine, &[]);
    cycle(&mut engine, &[]);
    assert!(
        first_weak.upgrade().is_none(),
        "Version should be retired once no occupancy uses it"
    );

    let current = cow.get().unwrap();
    assert_eq!(
        current.buffer().contents(),
        bytemuck::bytes_of(&Tint::grey(0.75)).to_vec()
    );
}

#[test]
fn test_version_used_by_both_slots_outlives_both() {
    let mut engine = framed(2);
    let cow = CowPrimitive::new(
        engine.base().clone(),
        HostBufferCow::<Tint>::new(BufferUsage::Uniform),
    );
    cow.reset(Tint::grey(0.5)).run().unwrap();
    let version = cow.get().unwrap();
    let weak = Arc::downgrade(&version);

    cycle(&mut engine, &[version.clone()]);
    cycle(&mut engine, &[version]);
    cow.clear();
    assert!(cow.get().is_none());

    for _ in 0..2 {
        cycle(&mut engine, &[]);
    }
    assert!(weak.upgrade().is_some());
    for _ in 0..2 {
        cycle(&mut engine, &[]);
    }
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_registration_is_idempotent_within_occupancy() {
    let mut engine = framed(1);
    let cow = CowPrimitive::new(
        engine.base().clone(),
        HostBufferCow::<Tint>::new(BufferUsage::Storage),
    );
    cow.reset(Tint::grey(1.0)).run().unwrap();
    let version = cow.get().unwrap();

    let slot = engine.begin_current_slot().unwrap();
    slot.use_primitive(&version);
    slot.use_primitive(&version);
    assert_eq!(slot.registered_count(), 1);
    engine.end_and_advance().unwrap();
}

/// Allocator whose initialization completes only when the test says so.
struct Gated {
    pending: Arc<Mutex<Vec<(u32, CompletionSignal)>>>,
}

impl CowAllocator<HeadlessBackend> for Gated {
    type Object = u32;
    type Args = u32;

    fn allocate(
        &self,
        _engine: &EngineBase<HeadlessBackend>,
        value: u32,
    ) -> EngineResult<(u32, Completion)> {
        let (signal, completion) = Completion::channel();
        self.pending.lock().unwrap().push((value, signal));
        Ok((value, completion))
    }
}

fn wait_for_pending(pending: &Mutex<Vec<(u32, CompletionSignal)>>, count: usize) {
    for _ in 0..1000 {
        if pending.lock().unwrap().len() >= count {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("Allocations did not start in time");
}

fn release(pending: &Mutex<Vec<(u32, CompletionSignal)>>, value: u32) {
    let mut pending = pending.lock().unwrap();
    let position = pending
        .iter()
        .position(|(v, _)| *v == value)
        .expect("No pending allocation with that value");
    pending.remove(position).1.signal();
}

#[test]
fn test_concurrent_resets_publish_in_completion_order() {
    let engine = framed(2);
    let pending = Arc::new(Mutex::new(Vec::new()));
    let cow = CowPrimitive::new(
        engine.base().clone(),
        Gated {
            pending: pending.clone(),
        },
    );
    let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();

    let first = cow.reset(1).spawn_on(&pool);
    let second = cow.reset(2).spawn_on(&pool);
    wait_for_pending(&pending, 2);
    assert!(cow.get().is_none(), "Nothing is published before initialization");

    // The later reset finishes first and is published first.
    release(&pending, 2);
    second.wait().unwrap();
    assert_eq!(cow.get().map(|c| **c), Some(2));

    // The earlier reset completes last, so its version wins.
    release(&pending, 1);
    first.wait().unwrap();
    assert_eq!(cow.get().map(|c| **c), Some(1));
}

#[test]
fn test_reset_stages_can_be_driven_separately() {
    let engine = framed(2);
    let pending = Arc::new(Mutex::new(Vec::new()));
    let cow = CowPrimitive::new(
        engine.base().clone(),
        Gated {
            pending: pending.clone(),
        },
    );

    let awaiting = cow.reset(7).allocate().unwrap();
    let waiter = thread::spawn(move || awaiting.wait().map(|publish| publish.publish()));
    wait_for_pending(&pending, 1);
    release(&pending, 7);
    waiter.join().unwrap().unwrap();
    assert_eq!(cow.get().map(|c| **c), Some(7));
}

#[test]
fn test_dropped_signal_fails_reset() {
    let engine = framed(2);
    let pending = Arc::new(Mutex::new(Vec::new()));
    let cow = CowPrimitive::new(
        engine.base().clone(),
        Gated {
            pending: pending.clone(),
        },
    );

    let awaiting = cow.reset(3).allocate().unwrap();
    pending.lock().unwrap().clear();
    assert!(awaiting.wait().is_err());
    assert!(cow.get().is_none());
}

#[test]
fn test_swap_buffers_written_per_slot_in_frame_loop() {
    let backend = Arc::new(HeadlessBackend::universal(1));
    let factory = Arc::new(SurfaceSwapchainFactory::new(
        backend.create_surface(vk::Extent2D {
            width: 320,
            height: 240,
        }),
        vk::Extent2D {
            width: 320,
            height: 240,
        },
    ));
    let context = Context::new(backend.clone());
    let mut engine = context
        .create_graphics_engine(GraphicsEngineCreateInfo::<HeadlessBackend>::new(factory))
        .unwrap();

    let mut tints = SwapPrimitive::new(
        engine.base().clone(),
        HostBufferSwap::<Tint>::new(BufferUsage::Uniform),
    );
    tints.reset_all(&()).unwrap();
    let slot0 = tints.get(0).unwrap();
    let slot1 = tints.get(1).unwrap();
    assert!(!Arc::ptr_eq(&slot0, &slot1), "Each slot owns its own buffer");

    let mut frame_number = 0.0;
    for _ in 0..3 {
        frame_number += 1.0;
        engine
            .render_frame(|frame| {
                tints.write(frame.slot(), Tint::grey(frame_number))?;
                if let Some(cell) = tints.get(frame.slot_index()) {
                    frame.use_primitive(&cell);
                }
                Ok(())
            })
            .unwrap();
    }

    // Frames 1 and 3 ran in slot 0, frame 2 in slot 1.
    assert_eq!(
        slot0.buffer().contents(),
        bytemuck::bytes_of(&Tint::grey(3.0)).to_vec()
    );
    assert_eq!(
        slot1.buffer().contents(),
        bytemuck::bytes_of(&Tint::grey(2.0)).to_vec()
    );
    let visible = Primitive::get(&tints, 0).unwrap();
    assert!(Arc::ptr_eq(&visible, &slot0));
}

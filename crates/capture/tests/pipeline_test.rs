//! Drives the capture orchestration end-to-end without hardware: a mock
//! vendor backend stands in for the camera, the test body plays the roles of
//! the GPIO trigger (submit) and the completion thread (complete).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use capture::camera::{CameraBackend, CameraHandler};
use capture::error::CaptureError;
use capture::pipeline::{FramePipeline, FrameSlot};
use handoff::SpscRing;

struct MockInner {
    pipeline: Arc<FramePipeline>,
    /// Stand-ins for the DMA mappings, one per cookie.
    buffers: Vec<Vec<u8>>,
    /// Requests parked between completion and the next submit.
    ready: SpscRing<usize>,
    /// Submitted cookies awaiting hardware completion, in order.
    inflight: Mutex<VecDeque<usize>>,
    stopped: AtomicBool,
}

#[derive(Clone)]
struct MockBackend(Arc<MockInner>);

impl MockBackend {
    fn new(pipeline: Arc<FramePipeline>, buffer_count: usize, frame_bytes: usize) -> Self {
        let buffers: Vec<Vec<u8>> = (0..buffer_count)
            .map(|cookie| vec![cookie as u8; frame_bytes])
            .collect();

        let ready = SpscRing::with_capacity(buffer_count);
        for cookie in 0..buffer_count {
            ready.push(cookie).unwrap();
        }

        Self(Arc::new(MockInner {
            pipeline,
            buffers,
            ready,
            inflight: Mutex::new(VecDeque::new()),
            stopped: AtomicBool::new(false),
        }))
    }

    /// Play the completion thread: the oldest submitted request finishes.
    /// Returns false when nothing was in flight.
    fn complete_next(&self) -> bool {
        let Some(cookie) = self.0.inflight.lock().unwrap().pop_front() else {
            return false;
        };

        // Cancelled requests are dropped by the callback without touching
        // the queue.
        if self.0.stopped.load(Ordering::Acquire) {
            return true;
        }

        let buffer = &self.0.buffers[cookie];
        self.0
            .pipeline
            .deliver(FrameSlot::new(buffer.as_ptr(), buffer.len()))
            .unwrap();
        self.0.ready.push(cookie).unwrap();
        true
    }

    fn in_flight(&self) -> usize {
        self.0.inflight.lock().unwrap().len()
    }

    fn parked(&self) -> usize {
        self.0.ready.len()
    }
}

impl CameraBackend for MockBackend {
    fn submit_next(&self) -> Result<(), CaptureError> {
        let Some(cookie) = self.0.ready.pop() else {
            return Err(CaptureError::QueueFailed);
        };
        self.0.inflight.lock().unwrap().push_back(cookie);
        Ok(())
    }

    fn stop(&self) {
        self.0.stopped.store(true, Ordering::Release);
    }
}

fn rig(buffer_count: usize) -> (Arc<FramePipeline>, MockBackend, CameraHandler) {
    let pipeline = Arc::new(FramePipeline::new(buffer_count).unwrap());
    let backend = MockBackend::new(Arc::clone(&pipeline), buffer_count, 64);
    let handler = CameraHandler::new(Box::new(backend.clone()), Arc::clone(&pipeline));
    (pipeline, backend, handler)
}

/// With N = 4 buffers, a submit at 2 enqueued frames (N - 2) is
/// accepted; at 3 (N - 1) the pipeline has fallen behind and the request
/// fails without touching the hardware.
#[test]
fn test_backpressure_boundary() {
    let (pipeline, backend, handler) = rig(4);

    for _ in 0..2 {
        handler.queue_request().unwrap();
        assert!(backend.complete_next());
    }
    assert_eq!(pipeline.queued_hint(), 2);

    handler.queue_request().unwrap();
    assert!(backend.complete_next());
    assert_eq!(pipeline.queued_hint(), 3);

    let err = handler.queue_request().unwrap_err();
    assert!(matches!(err, CaptureError::BufferNotReady));
    assert_eq!(backend.in_flight(), 0, "rejected submit must not reach hardware");
}

/// One accepted request produces exactly one completion, and frames cross
/// the queue in submission order.
#[test]
fn test_frames_flow_in_fifo_order() {
    let (pipeline, backend, handler) = rig(4);

    for expected_cookie in 0..3u8 {
        handler.queue_request().unwrap();
        assert!(backend.complete_next());
        assert!(!backend.complete_next(), "exactly one completion per request");

        pipeline.wait().unwrap();
        let slot = pipeline.claim().expect("completed frame is queued");
        let bytes = unsafe { slot.bytes() };
        assert!(bytes.iter().all(|b| *b == expected_cookie));
    }
}

/// Request conservation: every one of the N requests is either parked in
/// the ready ring or in flight to the hardware, and the frame queue never
/// holds more than N leases.
#[test]
fn test_request_states_partition_the_pool() {
    let (pipeline, backend, handler) = rig(4);

    let census = || backend.parked() + backend.in_flight();
    assert_eq!(census(), 4);

    handler.queue_request().unwrap();
    assert_eq!(census(), 4);

    handler.queue_request().unwrap();
    backend.complete_next();
    assert_eq!(census(), 4);

    pipeline.wait().unwrap();
    let _held = pipeline.claim().unwrap();
    assert_eq!(census(), 4);

    backend.complete_next();
    assert_eq!(census(), 4);
    assert!(pipeline.queued_hint() as usize <= pipeline.capacity());
}

/// Shutdown wake: an external post unblocks a consumer parked on the
/// counter, and the dequeue comes back empty.
#[test]
fn test_external_wake_unblocks_consumer() {
    let (pipeline, _backend, _handler) = rig(4);

    let waker = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || pipeline.wake())
    };

    pipeline.wait().unwrap();
    assert!(pipeline.claim().is_none());
    waker.join().unwrap();
}

/// After stop, in-flight requests complete as cancelled: no frame reaches
/// the queue and the counter stays put.
#[test]
fn test_completions_after_stop_are_cancelled() {
    let (pipeline, backend, handler) = rig(4);

    handler.queue_request().unwrap();
    handler.stop();

    assert!(backend.complete_next());
    assert_eq!(pipeline.queued_hint(), 0);
    assert!(pipeline.claim().is_none());
}

/// The trigger and completion sides may interleave arbitrarily; a full
/// produce/consume cycle across threads delivers every frame in order.
#[test]
fn test_concurrent_trigger_and_consume() {
    const FRAMES: usize = 200;

    let (pipeline, backend, handler) = rig(4);
    let handler = Arc::new(handler);

    let producer = {
        let backend = backend.clone();
        let handler = Arc::clone(&handler);
        thread::spawn(move || {
            let mut submitted = 0;
            while submitted < FRAMES {
                match handler.queue_request() {
                    Ok(()) => {
                        backend.complete_next();
                        submitted += 1;
                    }
                    Err(CaptureError::BufferNotReady) => thread::yield_now(),
                    Err(err) => panic!("unexpected submit failure: {err}"),
                }
            }
        })
    };

    let mut consumed = 0;
    while consumed < FRAMES {
        pipeline.wait().unwrap();
        if pipeline.claim().is_some() {
            consumed += 1;
        }
    }

    producer.join().unwrap();
    assert_eq!(pipeline.queued_hint(), 0);
}

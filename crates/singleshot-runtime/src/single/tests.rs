use crate::backend::{Backend, Hardware, Nnfw, register_custom_easy};
use crate::error::{MlError, MlResult};
use crate::single::{OpenOptions, SingleShot};
use crate::tensor::{Ownership, TensorType, TensorsData, TensorsInfo};
use crossbeam::channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn float_info(len: u32) -> TensorsInfo {
    let mut info = TensorsInfo::new();
    info.push_tensor(TensorType::Float32, &[len]).unwrap();
    info
}

fn scalar(value: f32) -> TensorsData {
    TensorsData::from_buffers(&float_info(1), vec![value.to_ne_bytes().to_vec()]).unwrap()
}

fn read_scalar(data: &TensorsData) -> f32 {
    f32::from_ne_bytes(data.tensor(0).unwrap()[..4].try_into().unwrap())
}

fn add_two(input: &[&[u8]]) -> anyhow::Result<Vec<u8>> {
    let value = f32::from_ne_bytes(input[0].try_into()?);
    Ok((value + 2.0).to_ne_bytes().to_vec())
}

fn open(backend: impl Backend + 'static) -> SingleShot {
    init_logger();
    SingleShot::open_with_backend(Box::new(backend), OpenOptions::default()).unwrap()
}

/// Adds 2.0 to a float32 scalar and counts its passes.
#[derive(Default)]
struct AddTwo {
    calls: Arc<AtomicUsize>,
}

impl Backend for AddTwo {
    fn input_info(&self) -> TensorsInfo {
        float_info(1)
    }

    fn output_info(&self) -> TensorsInfo {
        float_info(1)
    }

    fn invoke(&mut self, input: &[&[u8]], output: &mut [Vec<u8>], _: bool) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        output[0].copy_from_slice(&add_two(input)?);
        Ok(())
    }
}

/// Like [`AddTwo`], but every pass announces itself and waits for a permit.
struct Gated {
    started: Sender<()>,
    permits: Receiver<()>,
}

fn gated() -> (Gated, Receiver<()>, Sender<()>) {
    let (started_tx, started_rx) = unbounded();
    let (permits_tx, permits_rx) = unbounded();
    let backend = Gated {
        started: started_tx,
        permits: permits_rx,
    };
    (backend, started_rx, permits_tx)
}

impl Backend for Gated {
    fn input_info(&self) -> TensorsInfo {
        float_info(1)
    }

    fn output_info(&self) -> TensorsInfo {
        float_info(1)
    }

    fn invoke(&mut self, input: &[&[u8]], output: &mut [Vec<u8>], _: bool) -> anyhow::Result<()> {
        self.started.send(())?;
        self.permits.recv()?;
        output[0].copy_from_slice(&add_two(input)?);
        Ok(())
    }
}

/// Hands out its own output memory and counts how much comes back.
struct Allocating {
    released: Arc<AtomicUsize>,
    fail: bool,
    gate: Option<(Sender<()>, Receiver<()>)>,
}

impl Allocating {
    fn new(released: &Arc<AtomicUsize>) -> Self {
        Self {
            released: released.clone(),
            fail: false,
            gate: None,
        }
    }
}

impl Backend for Allocating {
    fn input_info(&self) -> TensorsInfo {
        float_info(1)
    }

    fn output_info(&self) -> TensorsInfo {
        float_info(1)
    }

    fn invoke(
        &mut self,
        input: &[&[u8]],
        output: &mut [Vec<u8>],
        allow_backend_alloc: bool,
    ) -> anyhow::Result<()> {
        anyhow::ensure!(allow_backend_alloc, "expected to allocate the output");
        if let Some((started, permits)) = &self.gate {
            started.send(())?;
            permits.recv()?;
        }
        output[0] = add_two(input)?;
        anyhow::ensure!(!self.fail, "simulated failure after allocating");
        Ok(())
    }

    fn allocates_output(&self) -> bool {
        true
    }

    fn release_backend_allocated(&mut self, output: Vec<Vec<u8>>) {
        assert_eq!(output.len(), 1);
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Accepts any float32 input and echoes it.
struct Echo {
    info: TensorsInfo,
    last_property: Option<(String, String)>,
}

impl Echo {
    fn new() -> Self {
        Self {
            info: float_info(1),
            last_property: None,
        }
    }
}

impl Backend for Echo {
    fn input_info(&self) -> TensorsInfo {
        self.info.clone()
    }

    fn output_info(&self) -> TensorsInfo {
        self.info.clone()
    }

    fn configure(&mut self, input: &TensorsInfo) -> MlResult<TensorsInfo> {
        if input.tensors().iter().any(|t| t.ty != TensorType::Float32) {
            return Err(MlError::invalid("only float32 tensors are supported"));
        }
        self.info = input.clone();
        Ok(input.clone())
    }

    fn invoke(&mut self, input: &[&[u8]], output: &mut [Vec<u8>], _: bool) -> anyhow::Result<()> {
        for (out, inp) in output.iter_mut().zip(input) {
            out.copy_from_slice(inp);
        }
        Ok(())
    }

    fn get_property(&self, key: &str) -> MlResult<String> {
        match (&self.last_property, key) {
            (Some((k, v)), key) if k == key => Ok(v.clone()),
            _ => Err(MlError::unsupported(key)),
        }
    }

    fn set_property(&mut self, key: &str, value: &str) -> MlResult<()> {
        self.last_property = Some((key.to_string(), value.to_string()));
        Ok(())
    }
}

struct Panicking;

impl Backend for Panicking {
    fn input_info(&self) -> TensorsInfo {
        float_info(1)
    }

    fn output_info(&self) -> TensorsInfo {
        float_info(1)
    }

    fn invoke(&mut self, _: &[&[u8]], _: &mut [Vec<u8>], _: bool) -> anyhow::Result<()> {
        panic!("backend exploded");
    }
}

/// Retries while the engine is still busy with an earlier pass.
fn invoke_when_idle(single: &SingleShot, input: &TensorsData) -> MlResult<TensorsData> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match single.invoke_with_timeout(input, Duration::ZERO) {
            Err(MlError::TryAgain) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(5))
            }
            result => return result,
        }
    }
}

fn wait_for(counter: &AtomicUsize, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while counter.load(Ordering::SeqCst) != expected && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(counter.load(Ordering::SeqCst), expected);
}

#[test]
fn test_sequential_invokes_return_fresh_results() {
    let calls = Arc::new(AtomicUsize::new(0));
    let single = open(AddTwo {
        calls: calls.clone(),
    });

    let output = single.invoke(&scalar(10.0)).unwrap();
    assert_eq!(read_scalar(&output), 12.0);
    assert_eq!(output.ownership(), Ownership::Caller);

    for i in 0..1000 {
        let output = single.invoke(&scalar(i as f32)).unwrap();
        assert_eq!(read_scalar(&output), i as f32 + 2.0);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1001);
    single.close().unwrap();
}

#[test]
fn test_sequential_backend_outputs_do_not_leak() {
    let released = Arc::new(AtomicUsize::new(0));
    let single = open(Allocating::new(&released));

    for i in 0..1000 {
        let output = single.invoke(&scalar(i as f32)).unwrap();
        assert_eq!(read_scalar(&output), i as f32 + 2.0);
    }
    assert_eq!(released.load(Ordering::SeqCst), 1000);
    assert_eq!(single.engine().shared.lock_recover().pending.len(), 0);

    single.close().unwrap();
    {
        let slot = single.engine().shared.lock_recover();
        assert_eq!(slot.pending.len(), 0);
        assert!(slot.backend.is_none());
    }
    // The counter is only shared with the backend, so this is its last owner.
    assert_eq!(Arc::strong_count(&released), 1);
    assert_eq!(released.load(Ordering::SeqCst), 1000);
}

#[test]
fn test_overflowing_input_shape_is_rejected() {
    let single = open(Echo::new());
    let mut huge = TensorsInfo::new();
    huge.push_tensor(TensorType::Float32, &[65536; 4]).unwrap();

    assert!(matches!(
        single.set_input_info(&huge),
        Err(MlError::InvalidParameter(_))
    ));
    assert!(matches!(
        single.invoke_dynamic(&scalar(1.0), &huge),
        Err(MlError::InvalidParameter(_))
    ));
    assert!(matches!(
        single.set_property("input", "65536:65536:65536:65536"),
        Err(MlError::InvalidParameter(_))
    ));

    assert_eq!(single.input_info().unwrap(), float_info(1));
    assert_eq!(read_scalar(&single.invoke(&scalar(1.0)).unwrap()), 1.0);
    single.set_timeout(Duration::from_millis(100)).unwrap();
    single.close().unwrap();
}

#[test]
fn test_shape_mismatch_never_reaches_the_backend() {
    let calls = Arc::new(AtomicUsize::new(0));
    let single = open(AddTwo {
        calls: calls.clone(),
    });

    let wide = TensorsData::new(&float_info(2)).unwrap();
    assert!(matches!(
        single.invoke(&wide),
        Err(MlError::InvalidParameter(_))
    ));
    let unpopulated = TensorsData::new_unallocated(&float_info(1)).unwrap();
    assert!(matches!(
        single.invoke(&unpopulated),
        Err(MlError::InvalidParameter(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(read_scalar(&single.invoke(&scalar(1.0)).unwrap()), 3.0);
}

#[test]
fn test_second_invoke_while_running_is_rejected() {
    let (backend, started, permits) = gated();
    let single = open(backend);

    thread::scope(|s| {
        let first = s.spawn(|| single.invoke(&scalar(10.0)));
        started.recv().unwrap();

        let begin = Instant::now();
        assert!(matches!(single.invoke(&scalar(1.0)), Err(MlError::TryAgain)));
        assert!(begin.elapsed() < Duration::from_secs(1));
        assert!(matches!(single.set_input_info(&float_info(2)), Err(MlError::TryAgain)));

        permits.send(()).unwrap();
        let output = first.join().unwrap().unwrap();
        assert_eq!(read_scalar(&output), 12.0);
    });
}

#[test]
fn test_timeout_leaves_the_engine_usable() {
    let (backend, started, permits) = gated();
    let single = open(backend);
    single.set_timeout(Duration::from_millis(50)).unwrap();

    let begin = Instant::now();
    assert!(matches!(single.invoke(&scalar(10.0)), Err(MlError::TimedOut)));
    assert!(begin.elapsed() >= Duration::from_millis(50));
    started.recv().unwrap();

    // Still busy with the timed out pass.
    assert!(matches!(single.invoke(&scalar(1.0)), Err(MlError::TryAgain)));

    permits.send(()).unwrap();
    permits.send(()).unwrap();
    let output = invoke_when_idle(&single, &scalar(20.0)).unwrap();
    assert_eq!(read_scalar(&output), 22.0);
    single.close().unwrap();
}

#[test]
fn test_timed_out_backend_output_is_released_by_the_worker() {
    let released = Arc::new(AtomicUsize::new(0));
    let (started_tx, started) = unbounded();
    let (permits, permits_rx) = unbounded();
    let mut backend = Allocating::new(&released);
    backend.gate = Some((started_tx, permits_rx));
    let single = open(backend);

    let result = single.invoke_with_timeout(&scalar(1.0), Duration::from_millis(20));
    assert!(matches!(result, Err(MlError::TimedOut)));
    started.recv().unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 0);

    permits.send(()).unwrap();
    wait_for(&released, 1);
    single.close().unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_backend_output_is_released_exactly_once() {
    let released = Arc::new(AtomicUsize::new(0));
    let single = open(Allocating::new(&released));

    let output = single.invoke(&scalar(5.0)).unwrap();
    assert_eq!(output.ownership(), Ownership::Backend);
    assert!(output.has_release_callback());
    assert_eq!(read_scalar(&output), 7.0);

    let copy = output.clone();
    output.destroy();
    drop(copy);
    assert_eq!(released.load(Ordering::SeqCst), 1);

    let kept = single.invoke(&scalar(1.0)).unwrap();
    single.close().unwrap();
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert_eq!(read_scalar(&kept), 3.0);
    drop(kept);
    assert_eq!(released.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failed_invoke_releases_backend_output() {
    let released = Arc::new(AtomicUsize::new(0));
    let mut backend = Allocating::new(&released);
    backend.fail = true;
    let single = open(backend);

    let result = single.invoke(&scalar(1.0));
    assert!(matches!(result, Err(MlError::StreamError(_))));
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_backend_panic_is_reported_as_stream_error() {
    let single = open(Panicking);
    for _ in 0..2 {
        match single.invoke(&scalar(1.0)) {
            Err(MlError::StreamError(message)) => assert!(message.contains("backend exploded")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
    single.close().unwrap();
}

#[test]
fn test_close_during_invoke_completes_the_waiting_call() {
    let (backend, started, permits) = gated();
    let single = open(backend);
    let id = single.id();
    assert!(id.is_live());

    thread::scope(|s| {
        let invoking = s.spawn(|| single.invoke(&scalar(10.0)));
        started.recv().unwrap();
        let closing = s.spawn(|| single.close());

        let deadline = Instant::now() + Duration::from_secs(5);
        while single.is_valid() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!single.is_valid());
        assert!(!id.is_live());
        assert!(matches!(single.input_info(), Err(MlError::InvalidHandle)));
        assert!(matches!(single.invoke(&scalar(1.0)), Err(MlError::InvalidHandle)));

        permits.send(()).unwrap();
        let output = invoking.join().unwrap().unwrap();
        assert_eq!(read_scalar(&output), 12.0);
        closing.join().unwrap().unwrap();
    });
    assert!(matches!(single.close(), Err(MlError::InvalidHandle)));
}

#[test]
fn test_output_awaited_during_close_outlives_the_engine() {
    let released = Arc::new(AtomicUsize::new(0));
    let (started_tx, started) = unbounded();
    let (permits, permits_rx) = unbounded();
    let mut backend = Allocating::new(&released);
    backend.gate = Some((started_tx, permits_rx));
    let single = open(backend);

    let output = thread::scope(|s| {
        let invoking = s.spawn(|| single.invoke(&scalar(3.0)));
        started.recv().unwrap();
        let closing = s.spawn(|| single.close());
        thread::sleep(Duration::from_millis(20));
        permits.send(()).unwrap();
        closing.join().unwrap().unwrap();
        invoking.join().unwrap()
    })
    .unwrap();

    assert_eq!(read_scalar(&output), 5.0);
    assert_eq!(released.load(Ordering::SeqCst), 0);
    drop(output);
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_closed_handle_rejects_every_operation() {
    let single = open(AddTwo::default());
    single.close().unwrap();

    assert!(!single.is_valid());
    assert!(matches!(single.close(), Err(MlError::InvalidHandle)));
    assert!(matches!(single.input_info(), Err(MlError::InvalidHandle)));
    assert!(matches!(single.output_info(), Err(MlError::InvalidHandle)));
    assert!(matches!(
        single.set_timeout(Duration::from_millis(1)),
        Err(MlError::InvalidHandle)
    ));
    assert!(matches!(
        single.get_property("input"),
        Err(MlError::InvalidHandle)
    ));
    assert!(matches!(single.invoke(&scalar(1.0)), Err(MlError::InvalidHandle)));
}

#[test]
fn test_drop_closes_the_handle() {
    let single = open(AddTwo::default());
    let id = single.id();
    assert!(id.is_live());
    drop(single);
    assert!(!id.is_live());
}

#[test]
fn test_fixed_shape_backend_rejects_new_input() {
    let single = open(AddTwo::default());
    let result = single.set_input_info(&float_info(4));
    assert!(matches!(result, Err(MlError::NotSupported(_))));
    assert_eq!(single.input_info().unwrap(), float_info(1));
    assert_eq!(single.output_info().unwrap(), float_info(1));

    // Same shape, nothing to negotiate.
    single.set_input_info(&float_info(1)).unwrap();
}

#[test]
fn test_reshaping_backend_updates_both_descriptors() {
    let single = open(Echo::new());
    single.set_input_info(&float_info(3)).unwrap();
    assert_eq!(single.output_info().unwrap(), float_info(3));

    let mut uint8 = TensorsInfo::new();
    uint8.push_tensor(TensorType::Uint8, &[3]).unwrap();
    assert!(single.set_input_info(&uint8).is_err());
    assert_eq!(single.input_info().unwrap(), float_info(3));
}

#[test]
fn test_invoke_into_fills_the_given_output() {
    let single = open(AddTwo::default());
    let mut output = TensorsData::new(&float_info(1)).unwrap();
    single.invoke_into(&scalar(4.0), &mut output).unwrap();
    assert_eq!(read_scalar(&output), 6.0);
    assert_eq!(output.ownership(), Ownership::Caller);

    let mut wrong = TensorsData::new(&float_info(2)).unwrap();
    assert!(matches!(
        single.invoke_into(&scalar(4.0), &mut wrong),
        Err(MlError::InvalidParameter(_))
    ));
}

#[test]
fn test_invoke_dynamic_renegotiates_the_input() {
    let single = open(Echo::new());
    let info = float_info(2);
    let input = TensorsData::from_buffers(
        &info,
        vec![[1.5f32.to_ne_bytes(), 2.5f32.to_ne_bytes()].concat()],
    )
    .unwrap();

    let (output, out_info) = single.invoke_dynamic(&input, &info).unwrap();
    assert_eq!(out_info, info);
    assert_eq!(output.tensor(0).unwrap(), input.tensor(0).unwrap());
    assert_eq!(single.input_info().unwrap(), info);
}

#[test]
fn test_invoke_dynamic_output_matches_the_requested_shape() {
    let single = open(Echo::new());
    let info = float_info(2);
    let input = TensorsData::new(&info).unwrap();
    let done = std::sync::atomic::AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            let shapes = [float_info(3), float_info(1)];
            for shape in shapes.iter().cycle() {
                if done.load(Ordering::SeqCst) {
                    break;
                }
                let _ = single.set_input_info(shape);
            }
        });

        for _ in 0..200 {
            let (output, out_info) = single.invoke_dynamic(&input, &info).unwrap();
            assert_eq!(out_info, info);
            assert_eq!(output.sizes(), vec![8]);
        }
        done.store(true, Ordering::SeqCst);
    });
}

#[test]
fn test_releasing_backend_output_waits_for_running_invoke() {
    let released = Arc::new(AtomicUsize::new(0));
    let (started_tx, started) = unbounded();
    let (permits, permits_rx) = unbounded();
    let mut backend = Allocating::new(&released);
    backend.gate = Some((started_tx, permits_rx));
    let single = open(backend);

    permits.send(()).unwrap();
    let first = single.invoke(&scalar(1.0)).unwrap();
    started.recv().unwrap();

    thread::scope(|s| {
        let invoking = s.spawn(|| single.invoke(&scalar(2.0)));
        started.recv().unwrap();
        let releasing = s.spawn(move || first.destroy());

        thread::sleep(Duration::from_millis(20));
        assert_eq!(released.load(Ordering::SeqCst), 0);

        permits.send(()).unwrap();
        releasing.join().unwrap();
        assert_eq!(read_scalar(&invoking.join().unwrap().unwrap()), 4.0);
    });
    assert_eq!(released.load(Ordering::SeqCst), 2);
}

#[test]
fn test_properties() {
    let single = open(Echo::new());
    assert_eq!(single.get_property("input").unwrap(), "1:1:1:1");
    assert_eq!(single.get_property("inputtype").unwrap(), "float32");
    assert_eq!(single.get_property("timeout").unwrap(), "0");
    assert_eq!(single.get_property("framework").unwrap(), "any");
    assert_eq!(single.get_property("accelerator").unwrap(), "any");

    single.set_property("timeout", "250").unwrap();
    assert_eq!(single.timeout().unwrap(), Duration::from_millis(250));
    assert!(single.set_property("timeout", "soon").is_err());

    single.set_property("input", "5").unwrap();
    assert_eq!(single.get_property("output").unwrap(), "5:1:1:1");
    single.set_property("inputname", "samples").unwrap();
    assert_eq!(single.get_property("inputname").unwrap(), "samples");

    assert!(matches!(
        single.set_property("output", "3"),
        Err(MlError::NotSupported(_))
    ));
    assert!(matches!(
        single.set_property("framework", "tflite"),
        Err(MlError::NotSupported(_))
    ));

    single.set_property("NumThreads", "4").unwrap();
    assert_eq!(single.get_property("NumThreads").unwrap(), "4");
    assert!(matches!(
        single.get_property("Delegate"),
        Err(MlError::NotSupported(_))
    ));
}

#[test]
fn test_open_through_the_registry() {
    init_logger();
    let info = float_info(1);
    register_custom_easy("engine-tests-add2", &info, &info, |input, output| {
        output[0].copy_from_slice(&add_two(input)?);
        Ok(())
    })
    .unwrap();

    let options = OpenOptions::new("engine-tests-add2").with_nnfw(Nnfw::CustomFilter);
    let single = SingleShot::open(options.clone()).unwrap();
    assert_eq!(single.framework(), Nnfw::CustomFilter);
    assert_eq!(read_scalar(&single.invoke(&scalar(10.0)).unwrap()), 12.0);
    single.close().unwrap();

    let result = SingleShot::open(options.clone().with_output_info(float_info(2)));
    assert!(matches!(result, Err(MlError::InvalidParameter(_))));

    let result = SingleShot::open(options.clone().with_input_info(float_info(2)));
    assert!(matches!(result, Err(MlError::InvalidParameter(_))));

    let result = SingleShot::open(options.with_hardware(Hardware::NpuEdgeTpu));
    assert!(matches!(result, Err(MlError::NotSupported(_))));

    let result = SingleShot::open(OpenOptions::new("missing").with_nnfw(Nnfw::CustomFilter));
    assert!(matches!(result, Err(MlError::InvalidParameter(_))));

    let result = SingleShot::open(OpenOptions::new("model.unknown"));
    assert!(matches!(result, Err(MlError::InvalidParameter(_))));

    let result = SingleShot::open(OpenOptions::new("model.dlc"));
    assert!(matches!(result, Err(MlError::NotSupported(_))));
}

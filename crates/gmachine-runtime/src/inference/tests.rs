use std::sync::{Arc, Mutex};

use burn::backend::NdArray;
use gmachine_topology::{
    Activation, InputType, Topology, data_layer, fc_layer, max_id_layer, slice_layer,
};

use crate::batch::BatchSize;
use crate::config::InferConfig;
use crate::engine::{GradientMachine, InputBatch, OutputRow, ParameterInfo, ParameterKind};
use crate::feeder::{FeedError, Sample};
use crate::field::{Field, FieldSelection, FieldValue};
use crate::inference::{Inference, InferenceError, infer};
use crate::machine::{BurnMachine, MachineError};
use crate::parameters::{ParameterArray, Parameters};

type TestBackend = NdArray<f32>;

#[derive(Clone, Debug, PartialEq)]
enum Event {
    Copy(String),
    Start,
    Forward(usize),
    Finish,
}

/// Echoes its `x` input, scaled by the single value of its `scale` parameter.
struct ScriptedMachine {
    events: Arc<Mutex<Vec<Event>>>,
    scale: Vec<f32>,
    started: bool,
    forwards: usize,
    fail_on: Option<usize>,
    panic_on: Option<usize>,
    with_ids: bool,
}

impl ScriptedMachine {
    fn new() -> Self {
        Self {
            events: Arc::default(),
            scale: vec![0.],
            started: false,
            forwards: 0,
            fail_on: None,
            panic_on: None,
            with_ids: false,
        }
    }

    fn failing_on(mut self, forward: usize) -> Self {
        self.fail_on = Some(forward);
        self
    }

    fn panicking_on(mut self, forward: usize) -> Self {
        self.panic_on = Some(forward);
        self
    }

    fn with_ids(mut self) -> Self {
        self.with_ids = true;
        self
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl GradientMachine for ScriptedMachine {
    fn parameters(&self) -> Vec<ParameterInfo> {
        vec![ParameterInfo::new(
            "scale".to_string(),
            ParameterKind::Value,
            vec![1, 1],
        )]
    }

    fn copy_parameter_from(
        &mut self,
        name: &str,
        kind: ParameterKind,
        values: &[f32],
    ) -> Result<(), MachineError> {
        if name != "scale" || kind != ParameterKind::Value {
            return Err(MachineError::UnknownBuffer {
                name: name.to_string(),
                kind,
            });
        }
        self.scale = values.to_vec();
        self.record(Event::Copy(name.to_string()));
        Ok(())
    }

    fn parameter_value(&self, _name: &str, _kind: ParameterKind) -> Result<Vec<f32>, MachineError> {
        Ok(self.scale.clone())
    }

    fn start(&mut self) -> Result<(), MachineError> {
        if self.started {
            return Err(MachineError::AlreadyStarted);
        }
        self.started = true;
        self.record(Event::Start);
        Ok(())
    }

    fn forward_test(&mut self, batch: &InputBatch) -> Result<Vec<OutputRow>, MachineError> {
        if !self.started {
            return Err(MachineError::NotStarted);
        }
        self.forwards += 1;
        self.record(Event::Forward(batch.size));
        if self.panic_on == Some(self.forwards) {
            panic!("scripted machine crashed");
        }
        if self.fail_on == Some(self.forwards) {
            return Err(MachineError::layer("scripted", "forward failed"));
        }

        let x = batch
            .get("x")
            .ok_or_else(|| MachineError::MissingInput("x".to_string()))?;
        Ok(x.rows()
            .map(|row| {
                let value: Vec<f32> = row.iter().map(|v| v * self.scale[0]).collect();
                let (id, prob) = if self.with_ids {
                    let (id, max) = value
                        .iter()
                        .copied()
                        .enumerate()
                        .fold((0, f32::MIN), |best, (i, v)| if v > best.1 { (i, v) } else { best });
                    (Some(vec![id as i64]), Some(vec![max]))
                } else {
                    (None, None)
                };
                OutputRow { value, id, prob }
            })
            .collect())
    }

    fn finish(&mut self) -> Result<(), MachineError> {
        if !self.started {
            return Err(MachineError::NotStarted);
        }
        self.started = false;
        self.record(Event::Finish);
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }
}

fn data_types() -> Vec<(String, InputType)> {
    vec![("x".to_string(), InputType::DenseVector(2))]
}

fn parameters(scale: f32) -> Parameters {
    Parameters::new().with("scale", ParameterArray::new(vec![1, 1], vec![scale]).unwrap())
}

fn session(machine: ScriptedMachine) -> (Inference<ScriptedMachine>, Arc<Mutex<Vec<Event>>>) {
    let events = machine.events.clone();
    let session = Inference::with_machine(machine, data_types(), &parameters(2.)).unwrap();
    events.lock().unwrap().clear();
    (session, events)
}

fn samples(n: usize) -> Vec<Sample> {
    (0..n)
        .map(|i| vec![vec![i as f32, 1.].into()])
        .collect()
}

fn events(events: &Arc<Mutex<Vec<Event>>>) -> Vec<Event> {
    events.lock().unwrap().clone()
}

#[test]
fn parameters_are_copied_into_the_machine() {
    let machine = ScriptedMachine::new();
    let events = machine.events.clone();
    let session = Inference::with_machine(machine, data_types(), &parameters(3.)).unwrap();

    assert_eq!(
        session.machine().parameter_value("scale", ParameterKind::Value).unwrap(),
        vec![3.]
    );
    assert_eq!(self::events(&events), vec![Event::Copy("scale".to_string())]);
}

#[test]
fn missing_parameter_fails_before_any_forward() {
    let machine = ScriptedMachine::new();
    let events = machine.events.clone();
    let err = Inference::with_machine(machine, data_types(), &Parameters::new())
        .err()
        .unwrap();

    assert!(matches!(err, InferenceError::MissingParameter(name) if name == "scale"));
    assert!(self::events(&events).is_empty());
}

#[test]
fn parameter_of_the_wrong_size_is_rejected() {
    let parameters = Parameters::new().with("scale", ParameterArray::zeros(vec![1, 2]));
    let err = Inference::with_machine(ScriptedMachine::new(), data_types(), &parameters)
        .err()
        .unwrap();

    assert!(matches!(
        err,
        InferenceError::ParameterShape { expected: 1, actual: 2, .. }
    ));
}

#[test]
fn whole_input_runs_as_one_bracketed_batch() {
    let (mut session, log) = session(ScriptedMachine::new());
    let batches: Vec<Vec<OutputRow>> = session
        .iter_infer(samples(3), &InferConfig::default())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0][2].value, vec![4., 2.]);
    assert_eq!(
        events(&log),
        vec![Event::Start, Event::Forward(3), Event::Finish]
    );
    assert!(!session.machine().is_started());
}

#[test]
fn fixed_batches_keep_input_order() {
    let (mut session, log) = session(ScriptedMachine::new());
    let config = InferConfig::default().with_batch_size(BatchSize::fixed(2).unwrap());
    let values: Vec<Vec<f32>> = session
        .iter_infer(samples(5), &config)
        .unwrap()
        .flat_map(|rows| rows.unwrap())
        .map(|row| row.value)
        .collect();

    assert_eq!(values.iter().map(|v| v[0]).collect::<Vec<_>>(), vec![0., 2., 4., 6., 8.]);
    assert_eq!(
        events(&log),
        vec![
            Event::Start,
            Event::Forward(2),
            Event::Forward(2),
            Event::Forward(1),
            Event::Finish
        ]
    );
}

#[test]
fn dropping_an_unfinished_run_finishes_the_machine() {
    let (mut session, log) = session(ScriptedMachine::new());
    let config = InferConfig::default().with_batch_size(BatchSize::fixed(1).unwrap());
    {
        let mut run = session.iter_infer(samples(4), &config).unwrap();
        run.next().unwrap().unwrap();
    }

    assert_eq!(
        events(&log),
        vec![Event::Start, Event::Forward(1), Event::Finish]
    );
    assert!(!session.machine().is_started());
}

#[test]
fn failing_batch_finishes_the_machine_and_ends_the_run() {
    let (mut session, log) = session(ScriptedMachine::new().failing_on(2));
    let config = InferConfig::default().with_batch_size(BatchSize::fixed(1).unwrap());
    let mut run = session.iter_infer(samples(4), &config).unwrap();

    assert!(run.next().unwrap().is_ok());
    assert!(matches!(run.next(), Some(Err(InferenceError::Machine(_)))));
    assert!(run.next().is_none());
    drop(run);

    assert_eq!(
        events(&log),
        vec![
            Event::Start,
            Event::Forward(1),
            Event::Forward(1),
            Event::Finish
        ]
    );
}

#[test]
fn malformed_sample_is_reported_and_finishes_the_machine() {
    let (mut session, log) = session(ScriptedMachine::new());
    let input: Vec<Sample> = vec![vec![vec![1.].into()]];
    let err = session.infer(input, &InferConfig::default()).unwrap_err();

    assert!(matches!(err, InferenceError::Feed(FeedError::Width { .. })));
    assert_eq!(events(&log), vec![Event::Start, Event::Finish]);
}

#[test]
fn empty_input_still_brackets_the_run() {
    let (mut session, log) = session(ScriptedMachine::new());
    let result = session.infer(Vec::new(), &InferConfig::default()).unwrap();

    assert!(result.is_empty());
    assert_eq!(events(&log), vec![Event::Start, Event::Finish]);
}

#[test]
fn fields_are_projected_in_request_order() {
    let (mut session, _) = session(ScriptedMachine::new().with_ids());
    let config = InferConfig::default()
        .with_fields(FieldSelection::new(vec![Field::Prob, Field::Id]).unwrap());
    let rows: Vec<Vec<FieldValue>> = session
        .iter_infer_field(samples(2), &config)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(
        rows,
        vec![
            vec![FieldValue::Values(vec![2.]), FieldValue::Ids(vec![1])],
            vec![FieldValue::Values(vec![2.]), FieldValue::Ids(vec![0])],
        ]
    );
}

#[test]
fn unavailable_field_is_an_error() {
    let (mut session, log) = session(ScriptedMachine::new());
    let err = session
        .infer(samples(2), &InferConfig::default().with_fields(Field::Id))
        .unwrap_err();

    assert!(matches!(err, InferenceError::FieldUnavailable(Field::Id)));
    assert_eq!(
        events(&log),
        vec![Event::Start, Event::Forward(2), Event::Finish]
    );
}

#[test]
fn infer_collects_one_column_per_field() {
    let (mut session, _) = session(ScriptedMachine::new().with_ids());
    let config = InferConfig::default()
        .with_batch_size(BatchSize::fixed(2).unwrap())
        .with_fields(FieldSelection::new(vec![Field::Value, Field::Id]).unwrap());
    let result = session.infer(samples(3), &config).unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result.columns().len(), 2);
    assert_eq!(
        result.column(Field::Id).unwrap(),
        &[
            FieldValue::Ids(vec![1]),
            FieldValue::Ids(vec![0]),
            FieldValue::Ids(vec![0]),
        ]
    );
    assert_eq!(result.column(Field::Prob), None);

    let single = session
        .infer(samples(1), &InferConfig::default())
        .unwrap()
        .into_single()
        .unwrap();
    assert_eq!(single, vec![FieldValue::Values(vec![0., 2.])]);
}

#[test]
fn spawned_job_streams_every_batch() {
    let (session, log) = session(ScriptedMachine::new());
    let config = InferConfig::default().with_batch_size(BatchSize::fixed(2).unwrap());
    let job = session.spawn(samples(5), config);

    let sizes: Vec<usize> = job.stream.iter().map(|rows| rows.len()).collect();
    let session = job.join().unwrap();

    assert_eq!(sizes, vec![2, 2, 1]);
    assert!(!session.machine().is_started());
    assert_eq!(events(&log).last(), Some(&Event::Finish));
}

#[test]
fn cancelled_job_stops_and_finishes_the_machine() {
    let (session, log) = session(ScriptedMachine::new());
    let config = InferConfig::default().with_batch_size(BatchSize::fixed(1).unwrap());
    let unbounded = std::iter::repeat_with(|| -> Sample { vec![vec![1., 1.].into()] });
    let job = session.spawn(unbounded, config);

    job.stream.recv().unwrap();
    job.stream.recv().unwrap();
    job.cancel();
    let err = job.join().err().unwrap();

    assert!(matches!(err, InferenceError::Cancelled));
    let log = events(&log);
    assert_eq!(log.first(), Some(&Event::Start));
    assert_eq!(log.last(), Some(&Event::Finish));
    assert_eq!(log.iter().filter(|e| **e == Event::Finish).count(), 1);
}

#[test]
fn panicking_job_reports_the_panic_message_once() {
    let (session, _) = session(ScriptedMachine::new().panicking_on(2));
    let config = InferConfig::default().with_batch_size(BatchSize::fixed(1).unwrap());
    let job = session.spawn(samples(3), config);

    let received: Vec<Vec<OutputRow>> = job.stream.iter().collect();
    let err = job.join().err().unwrap();

    assert_eq!(received.len(), 1);
    assert!(matches!(
        &err,
        InferenceError::ThreadPanicked(message) if message == "scripted machine crashed"
    ));
    assert_eq!(
        err.to_string(),
        "Inference thread panicked: scripted machine crashed"
    );
}

fn slice_topology() -> Topology {
    let input = data_layer("input", 300, Some(100), Some(3)).unwrap();
    let slice = slice_layer("slice", &input, 0, 50, 2).unwrap();
    Topology::new([slice]).unwrap()
}

#[test]
fn slice_network_keeps_the_leading_rows() {
    let topology = slice_topology();
    assert_eq!(topology.proto().layer("slice").unwrap().size, 150);

    let sample: Sample = vec![(0..300).map(|v| v as f32).collect::<Vec<f32>>().into()];
    let result = infer::<TestBackend, _>(
        &topology,
        &Parameters::new(),
        vec![sample],
        &InferConfig::default(),
        &Default::default(),
    )
    .unwrap();

    let expected: Vec<f32> = (0..150).map(|v| v as f32).collect();
    assert_eq!(
        result.into_single().unwrap(),
        vec![FieldValue::Values(expected)]
    );
}

#[test]
fn burn_machine_runs_loaded_parameters() {
    let x = data_layer("x", 2, None, None).unwrap();
    let fc = fc_layer("fc", &x, 2, Activation::Linear, false).unwrap();
    let best = max_id_layer("best", &fc).unwrap();
    let topology = Topology::new([best]).unwrap();

    // Swaps the two inputs.
    let parameters = Parameters::new().with(
        "_fc.w0",
        ParameterArray::from_rows(&[vec![0., 1.], vec![1., 0.]]).unwrap(),
    );
    let mut session =
        Inference::<BurnMachine<TestBackend>>::new(&topology, &parameters, &Default::default())
            .unwrap();

    let config = InferConfig::default()
        .with_fields(FieldSelection::new(vec![Field::Id, Field::Prob]).unwrap());
    let result = session
        .infer(vec![vec![vec![5., 1.].into()], vec![vec![0., 2.].into()]], &config)
        .unwrap();

    assert_eq!(
        result.column(Field::Id).unwrap(),
        &[FieldValue::Ids(vec![1]), FieldValue::Ids(vec![0])]
    );
    assert_eq!(
        result.column(Field::Prob).unwrap(),
        &[FieldValue::Values(vec![5.]), FieldValue::Values(vec![2.])]
    );
}

#[test]
fn burn_session_requires_every_parameter() {
    let x = data_layer("x", 2, None, None).unwrap();
    let fc = fc_layer("fc", &x, 2, Activation::Relu, true).unwrap();
    let topology = Topology::new([fc]).unwrap();
    let parameters = Parameters::from_topology_zeros(&topology);
    let partial = Parameters::new().with(
        "_fc.w0",
        parameters.get("_fc.w0").unwrap().clone(),
    );

    assert!(
        Inference::<BurnMachine<TestBackend>>::new(&topology, &parameters, &Default::default())
            .is_ok()
    );
    let err = Inference::<BurnMachine<TestBackend>>::new(&topology, &partial, &Default::default())
        .err()
        .unwrap();
    assert!(matches!(err, InferenceError::MissingParameter(name) if name == "_fc.wbias"));
}

#[test]
fn machines_are_built_from_a_round_tripped_proto() {
    let json = slice_topology().to_json().unwrap();
    let config = gmachine_topology::ModelConfig::from_json(&json).unwrap();
    let machine = BurnMachine::<TestBackend>::create_from_config(
        config,
        crate::engine::CreateMode::Testing,
        &[ParameterKind::Value],
        &Default::default(),
    )
    .unwrap();
    let data_types = machine.config().data_types();
    let mut session = Inference::with_machine(machine, data_types, &Parameters::new()).unwrap();

    let input: Vec<Sample> = vec![vec![vec![1.; 300].into()]];
    let result = session.infer(input, &InferConfig::default()).unwrap();
    assert_eq!(result.into_single().unwrap(), vec![FieldValue::Values(vec![1.; 150])]);
}

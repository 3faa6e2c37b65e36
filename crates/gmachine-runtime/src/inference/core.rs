use burn::tensor::backend::Backend;
use gmachine_topology::{InputType, Topology};

use crate::batch::batches;
use crate::config::InferConfig;
use crate::engine::{CreateMode, GradientMachine, ParameterKind};
use crate::feeder::{DataFeeder, Sample};
use crate::machine::BurnMachine;
use crate::parameters::Parameters;

use super::error::InferenceError;
use super::iter::{FieldIter, InferIter};
use super::result::InferResult;

/// A gradient machine loaded with parameters, ready to run forward passes.
pub struct Inference<M: GradientMachine> {
    machine: M,
    data_types: Vec<(String, InputType)>,
}

impl<B: Backend> Inference<BurnMachine<B>> {
    /// Builds a forward-only burn machine for `topology` and loads `parameters` into it.
    pub fn new(
        topology: &Topology,
        parameters: &Parameters,
        device: &B::Device,
    ) -> Result<Self, InferenceError> {
        let machine = BurnMachine::create_from_config(
            topology.proto().clone(),
            CreateMode::Testing,
            &[ParameterKind::Value],
            device,
        )?;
        Self::with_machine(machine, topology.data_types(), parameters)
    }
}

impl<M: GradientMachine> Inference<M> {
    /// Loads every value buffer the machine reports from `parameters`.
    ///
    /// Fails on the first buffer without a supplied value, before any forward pass can run.
    pub fn with_machine(
        mut machine: M,
        data_types: Vec<(String, InputType)>,
        parameters: &Parameters,
    ) -> Result<Self, InferenceError> {
        for info in machine.parameters() {
            if info.kind != ParameterKind::Value {
                continue;
            }
            let array = parameters
                .get(&info.name)
                .ok_or_else(|| InferenceError::MissingParameter(info.name.clone()))?;
            let expected = info.size();
            if array.len() != expected {
                return Err(InferenceError::ParameterShape {
                    name: info.name,
                    expected,
                    actual: array.len(),
                });
            }
            machine.copy_parameter_from(&info.name, info.kind, array.flatten())?;
            log::debug!("Loaded parameter '{}' {:?}", info.name, info.dims);
        }

        Ok(Self {
            machine,
            data_types,
        })
    }

    pub fn data_types(&self) -> &[(String, InputType)] {
        &self.data_types
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn into_machine(self) -> M {
        self.machine
    }

    /// Lazily runs one forward pass per input batch.
    ///
    /// The machine is started before this returns. See [`InferIter`] for when it is finished.
    pub fn iter_infer<I>(
        &mut self,
        input: I,
        config: &InferConfig,
    ) -> Result<InferIter<'_, M, I::IntoIter>, InferenceError>
    where
        I: IntoIterator<Item = Sample>,
    {
        let feeder = DataFeeder::new(&self.data_types, config.feeding.as_ref())?;
        let batches = batches(input, config.batch_size);
        InferIter::new(&mut self.machine, feeder, batches)
    }

    /// Like [`iter_infer`](Self::iter_infer), yielding the requested fields of each output row.
    pub fn iter_infer_field<I>(
        &mut self,
        input: I,
        config: &InferConfig,
    ) -> Result<FieldIter<'_, M, I::IntoIter>, InferenceError>
    where
        I: IntoIterator<Item = Sample>,
    {
        let fields = config.fields.clone();
        Ok(FieldIter::new(self.iter_infer(input, config)?, fields))
    }

    /// Runs the whole input and gathers every requested field into its own column.
    pub fn infer<I>(&mut self, input: I, config: &InferConfig) -> Result<InferResult, InferenceError>
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut result = InferResult::new(config.fields());
        for row in self.iter_infer_field(input, config)? {
            result.push_row(row?);
        }
        log::debug!("Inference produced {} row(s)", result.len());
        Ok(result)
    }
}

/// One-shot inference: builds a session for `topology` and runs `input` through it.
pub fn infer<B, I>(
    topology: &Topology,
    parameters: &Parameters,
    input: I,
    config: &InferConfig,
    device: &B::Device,
) -> Result<InferResult, InferenceError>
where
    B: Backend,
    I: IntoIterator<Item = Sample>,
{
    Inference::<BurnMachine<B>>::new(topology, parameters, device)?.infer(input, config)
}

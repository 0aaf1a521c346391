use super::algorithm::Algorithm;
use super::bag::PropertyBag;
use super::config::EngineConfig;
use super::context::ExecutionContext;
use super::error::EngineError;
use super::group::{DispatchMode, FanOutPlan};
use super::history::{OutputOrigin, propagate};
use super::lock::{LockSet, with_locks};
use super::progress::{Progress, ProgressReporter};
use super::property::{Direction, PropertyValue};
use super::state::{ExecutionReport, ExecutionState, ResultState};
use super::validation;
use crate::core::index::{IndexKind, IndexSpecification};
use crate::core::models::group::WorkspaceGroup;
use crate::core::models::history::{InvocationRecord, WorkspaceHistory};
use crate::core::models::ids::WorkspaceId;
use crate::core::models::workspace::Workspace;
use crate::core::registry::WorkspaceRegistry;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// The shared resources invocations run against.
#[derive(Clone, Copy)]
pub struct Engine<'a> {
    registry: &'a WorkspaceRegistry,
    config: &'a EngineConfig,
    reporter: &'a ProgressReporter<'a>,
}

impl<'a> Engine<'a> {
    pub fn new(
        registry: &'a WorkspaceRegistry,
        config: &'a EngineConfig,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            registry,
            config,
            reporter,
        }
    }

    pub fn registry(&self) -> &'a WorkspaceRegistry {
        self.registry
    }

    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    pub fn reporter(&self) -> &'a ProgressReporter<'a> {
        self.reporter
    }
}

/// One configured use of an algorithm and its lifecycle.
pub struct Invocation {
    algorithm: Box<dyn Algorithm>,
    bag: PropertyBag,
    state: ExecutionState,
    result: ResultState,
}

impl Invocation {
    pub fn new(algorithm: Box<dyn Algorithm>) -> Self {
        Self {
            algorithm,
            bag: PropertyBag::new(),
            state: ExecutionState::Uninitialized,
            result: ResultState::NotFinished,
        }
    }

    /// Creates the invocation and declares its properties.
    pub fn initialized(algorithm: Box<dyn Algorithm>) -> Result<Self, EngineError> {
        let mut invocation = Self::new(algorithm);
        invocation.initialize()?;
        Ok(invocation)
    }

    /// `Uninitialized -> Initialized`: lets the algorithm declare its properties.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        if self.state != ExecutionState::Uninitialized {
            return Err(EngineError::InvalidState {
                action: "initialize",
                state: self.state,
            });
        }
        let mut bag = PropertyBag::new();
        self.algorithm.declare(&mut bag)?;
        self.bag = bag;
        self.state = ExecutionState::Initialized;
        Ok(())
    }

    pub fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn version(&self) -> u32 {
        self.algorithm.version()
    }

    pub fn algorithm(&self) -> &dyn Algorithm {
        &*self.algorithm
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn result_state(&self) -> ResultState {
        self.result
    }

    pub fn is_executed(&self) -> bool {
        self.result == ResultState::Success
    }

    pub fn bag(&self) -> &PropertyBag {
        &self.bag
    }

    fn ensure_configurable(&self, action: &'static str) -> Result<(), EngineError> {
        match self.state {
            ExecutionState::Uninitialized | ExecutionState::Running => {
                Err(EngineError::InvalidState {
                    action,
                    state: self.state,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<(), EngineError> {
        self.ensure_configurable("configure")?;
        Ok(self.bag.set(name, value)?)
    }

    pub fn set_compound(
        &mut self,
        name: &str,
        dataset: &str,
        kind: IndexKind,
        spec: impl Into<IndexSpecification>,
    ) -> Result<(), EngineError> {
        self.ensure_configurable("configure")?;
        Ok(self.bag.set_compound(name, dataset, kind, spec)?)
    }

    /// Validates, then runs the algorithm directly or once per group member.
    ///
    /// Validation failures leave the invocation `Initialized` with no lock ever taken.
    /// Once running, any failure (a panic included) ends in `Failed`, with every lock
    /// released and the original message preserved.
    #[instrument(skip_all, name = "algorithm_execution", fields(algorithm = self.algorithm.name()))]
    pub fn execute(&mut self, engine: &Engine<'_>) -> Result<ExecutionReport, EngineError> {
        if matches!(
            self.state,
            ExecutionState::Uninitialized | ExecutionState::Running
        ) {
            return Err(EngineError::InvalidState {
                action: "execute",
                state: self.state,
            });
        }
        self.state = ExecutionState::Initialized;
        self.result = ResultState::NotFinished;

        let plan = validation::validate(
            &*self.algorithm,
            &self.bag,
            engine.registry,
            engine.config.group_separator,
        )
        .inspect_err(|err| warn!(%err, "Validation failed"))?;

        self.state = ExecutionState::Running;
        info!(mode = ?plan.mode(), shots = plan.size(), "Executing algorithm");
        let started = Instant::now();

        let algorithm = &*self.algorithm;
        let bag = &self.bag;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| dispatch(algorithm, bag, &plan, engine)))
            .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(outputs) => {
                self.state = ExecutionState::Finished;
                self.result = ResultState::Success;
                let duration = started.elapsed();
                info!(?duration, "Algorithm finished");
                Ok(ExecutionReport {
                    algorithm: self.algorithm.name().to_string(),
                    version: self.algorithm.version(),
                    mode: plan.mode(),
                    shots: plan.size(),
                    outputs,
                    duration,
                })
            }
            Err(err) => {
                self.state = ExecutionState::Failed;
                self.result = ResultState::Failed;
                error!(%err, "Algorithm failed");
                Err(err)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

fn dispatch(
    algorithm: &dyn Algorithm,
    bag: &PropertyBag,
    plan: &FanOutPlan,
    engine: &Engine<'_>,
) -> Result<BTreeMap<String, String>, EngineError> {
    match plan.mode() {
        DispatchMode::Direct => Ok(execute_shot(algorithm, bag, engine)?.into_iter().collect()),
        DispatchMode::GroupFanOut => fan_out(algorithm, bag, plan, engine),
    }
}

/// Reports `TaskFinish` when dropped, so the task is closed on every way out of a fan-out.
struct TaskProgress<'r, 'a> {
    reporter: &'r ProgressReporter<'a>,
}

impl<'r, 'a> TaskProgress<'r, 'a> {
    fn start(reporter: &'r ProgressReporter<'a>, total_steps: u64) -> Self {
        reporter.report(Progress::TaskStart { total_steps });
        Self { reporter }
    }

    fn increment(&self) {
        self.reporter.report(Progress::TaskIncrement);
    }
}

impl Drop for TaskProgress<'_, '_> {
    fn drop(&mut self) {
        self.reporter.report(Progress::TaskFinish);
    }
}

#[instrument(skip_all, name = "group_fan_out", fields(members = plan.size()))]
fn fan_out(
    algorithm: &dyn Algorithm,
    bag: &PropertyBag,
    plan: &FanOutPlan,
    engine: &Engine<'_>,
) -> Result<BTreeMap<String, String>, EngineError> {
    let task = TaskProgress::start(engine.reporter, plan.size() as u64);

    let mut produced: BTreeMap<&str, Vec<String>> = plan
        .outputs()
        .iter()
        .map(|o| (o.property.as_str(), Vec::new()))
        .collect();

    for iteration in 0..plan.size() {
        let member = plan.member_label(iteration);
        debug!(iteration, member = member.as_str(), "Executing group member");

        let shot = plan
            .member_bag(bag, iteration)
            .map_err(EngineError::from)
            .and_then(|member_bag| execute_shot(algorithm, &member_bag, engine));
        let outputs = match shot {
            Ok(outputs) => outputs,
            Err(source) => {
                return Err(EngineError::MemberExecutionFailure {
                    index: iteration,
                    member,
                    source: Box::new(source),
                });
            }
        };
        for (property, name) in outputs {
            if let Some(names) = produced.get_mut(property.as_str()) {
                names.push(name);
            }
        }
        task.increment();
    }
    drop(task);

    let mut groups = BTreeMap::new();
    for output in plan.outputs() {
        let members = produced.remove(output.property.as_str()).unwrap_or_default();
        if members.is_empty() {
            continue;
        }
        engine
            .registry
            .add_group(&output.base, WorkspaceGroup::new(members))?;
        groups.insert(output.property.clone(), output.base.clone());
    }
    for binding in plan.bindings() {
        if bag.property(&binding.property)?.direction() == Direction::InOut {
            groups.insert(binding.property.clone(), binding.group.clone());
        }
    }
    Ok(groups)
}

/// One direct execution: lock, run the body, update outputs and their histories, unlock.
fn execute_shot(
    algorithm: &dyn Algorithm,
    bag: &PropertyBag,
    engine: &Engine<'_>,
) -> Result<Vec<(String, String)>, EngineError> {
    let record = InvocationRecord::new(algorithm.name(), algorithm.version(), bag.render_values());
    let started = Instant::now();

    with_locks(bag, engine.registry, |locks| {
        let staged = {
            let mut ctx = ExecutionContext::new(bag, locks, engine.reporter, engine.config);
            algorithm.exec(&mut ctx)?;
            ctx.into_outputs()
        };
        let record = record.with_duration(started.elapsed());
        commit_outputs(bag, engine, locks, staged, record)
    })
}

/// Distinct input workspaces in declaration order, multiperiod groups expanded.
fn input_identities(bag: &PropertyBag, locks: &LockSet) -> Vec<(WorkspaceId, String)> {
    let mut inputs: Vec<(WorkspaceId, String)> = Vec::new();
    for property in bag
        .workspace_properties()
        .filter(|p| p.direction().is_input())
    {
        let Some(value) = property.value() else {
            continue;
        };
        let name = value.to_string();
        let names = match locks.members(&name) {
            Some(members) => members.to_vec(),
            None => vec![name],
        };
        for name in names {
            if let Some(id) = locks.id_of(&name) {
                if !inputs.iter().any(|(seen, _)| *seen == id) {
                    inputs.push((id, name));
                }
            }
        }
    }
    inputs
}

/// Histories of `inputs`, copied out so outputs can be written while they are in use.
fn input_histories(
    inputs: &[(WorkspaceId, String)],
    locks: &LockSet,
) -> Result<Vec<WorkspaceHistory>, EngineError> {
    inputs
        .iter()
        .map(|(_, input)| locks.read(input).map(|w| w.history().clone()))
        .collect()
}

/// Records `record` on every member of a multiperiod output group.
///
/// The members were locked for writing and modified through the context. When every
/// member is also an input the group was updated in place; otherwise each member starts a
/// fresh history from the inputs.
fn commit_group_output(
    property: &str,
    group: &str,
    members: &[String],
    staged: Option<Workspace>,
    inputs: &[(WorkspaceId, String)],
    locks: &mut LockSet,
    record: Option<&InvocationRecord>,
) -> Result<bool, EngineError> {
    if staged.is_some() {
        return Err(EngineError::Execution(format!(
            "Output property '{property}' names the multiperiod group '{group}', which cannot \
             be replaced by a single workspace"
        )));
    }
    let in_place = members.iter().all(|member| {
        locks
            .id_of(member)
            .is_some_and(|id| inputs.iter().any(|(input, _)| *input == id))
    });
    let Some(record) = record else {
        return Ok(in_place);
    };

    let (origin, histories) = if in_place {
        (OutputOrigin::InPlace, Vec::new())
    } else {
        (OutputOrigin::Fresh, input_histories(inputs, locks)?)
    };
    let histories: Vec<&WorkspaceHistory> = histories.iter().collect();
    for member in locks.write_all(group)? {
        propagate(member, origin, &histories, record.clone());
    }
    Ok(in_place)
}

fn commit_outputs(
    bag: &PropertyBag,
    engine: &Engine<'_>,
    locks: &mut LockSet,
    mut staged: BTreeMap<String, Workspace>,
    record: InvocationRecord,
) -> Result<Vec<(String, String)>, EngineError> {
    let record_history = engine.config.record_history;
    let inputs = input_identities(bag, locks);
    let mut produced = Vec::new();

    for property in bag
        .workspace_properties()
        .filter(|p| p.direction().is_output())
    {
        let Some(value) = property.value() else {
            continue;
        };
        let name = value.to_string();
        if let Some(members) = locks.members(&name).map(<[String]>::to_vec) {
            let in_place = commit_group_output(
                property.name(),
                &name,
                &members,
                staged.remove(property.name()),
                &inputs,
                locks,
                record_history.then_some(&record),
            )?;
            debug!(
                property = property.name(),
                group = name.as_str(),
                in_place,
                "Committed multiperiod output"
            );
            produced.push((property.name().to_string(), name));
            continue;
        }
        let in_place = locks
            .id_of(&name)
            .is_some_and(|id| inputs.iter().any(|(input, _)| *input == id));

        match (staged.remove(property.name()), in_place) {
            (Some(mut workspace), true) => {
                let target = locks.write(&name)?;
                workspace.set_history(std::mem::take(target.history_mut()));
                *target = workspace;
                if record_history {
                    propagate(target, OutputOrigin::InPlace, &[], record.clone());
                }
            }
            (None, true) => {
                if record_history {
                    propagate(locks.write(&name)?, OutputOrigin::InPlace, &[], record.clone());
                }
            }
            (Some(mut workspace), false) => {
                if record_history {
                    let histories = inputs
                        .iter()
                        .map(|(_, input)| locks.read(input).map(Workspace::history))
                        .collect::<Result<Vec<&WorkspaceHistory>, _>>()?;
                    propagate(&mut workspace, OutputOrigin::Fresh, &histories, record.clone());
                }
                engine.registry.add_or_replace(&name, workspace)?;
            }
            (None, false) if property.is_mandatory() => {
                return Err(EngineError::Execution(format!(
                    "Output property '{}' was not produced",
                    property.name()
                )));
            }
            (None, false) => continue,
        }
        debug!(property = property.name(), workspace = name.as_str(), in_place, "Committed output");
        produced.push((property.name().to_string(), name));
    }
    Ok(produced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{CreateWorkspace, Plus, Scale};
    use crate::core::models::group::WorkspaceGroup;
    use crate::engine::property::{Property, PropertyError};
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Concatenates the titles of up to three inputs into a copy of the first.
    struct ConcatTitles {
        fail_on: Option<&'static str>,
    }

    impl Algorithm for ConcatTitles {
        fn name(&self) -> &'static str {
            "ConcatTitles"
        }

        fn summary(&self) -> &'static str {
            "Test fixture"
        }

        fn declare(&self, bag: &mut PropertyBag) -> Result<(), PropertyError> {
            bag.declare(Property::workspace("First", Direction::Input))?;
            bag.declare(Property::workspace("Second", Direction::Input))?;
            bag.declare(Property::workspace("Third", Direction::Input).optional())?;
            bag.declare(Property::workspace("OutputWorkspace", Direction::Output))
        }

        fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
            let first = ctx.bag().workspace_name("First")?;
            if self.fail_on == Some(first) {
                return Err(EngineError::Execution(format!("refusing to process {first}")));
            }
            let mut title = String::new();
            for property in ["First", "Second", "Third"] {
                if ctx.bag().has_value(property) {
                    title.push_str(&ctx.workspace(property)?.title);
                }
            }
            let mut output = ctx.workspace("First")?.clone();
            output.title = title;
            ctx.set_output("OutputWorkspace", output)
        }
    }

    struct Panicking;

    impl Algorithm for Panicking {
        fn name(&self) -> &'static str {
            "Panicking"
        }

        fn summary(&self) -> &'static str {
            "Test fixture"
        }

        fn declare(&self, bag: &mut PropertyBag) -> Result<(), PropertyError> {
            bag.declare(Property::workspace("Workspace", Direction::InOut))
        }

        fn exec(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
            panic!("body exploded")
        }
    }

    /// Adds the periods of a multiperiod input into one workspace.
    struct SumPeriods;

    impl Algorithm for SumPeriods {
        fn name(&self) -> &'static str {
            "SumPeriods"
        }

        fn summary(&self) -> &'static str {
            "Test fixture"
        }

        fn declare(&self, bag: &mut PropertyBag) -> Result<(), PropertyError> {
            bag.declare(Property::workspace("InputWorkspace", Direction::Input))?;
            bag.declare(Property::workspace("OutputWorkspace", Direction::Output))
        }

        fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
            let periods = ctx.workspaces("InputWorkspace")?;
            let Some((first, rest)) = periods.split_first() else {
                return Err(EngineError::Execution("no periods".to_string()));
            };
            let mut total = (*first).clone();
            for period in rest {
                total.title = format!("{}+{}", total.title, period.title);
                for (sum, spectrum) in total.spectra_mut().iter_mut().zip(period.spectra()) {
                    for (a, b) in sum.counts.iter_mut().zip(&spectrum.counts) {
                        *a += b;
                    }
                }
            }
            ctx.set_output("OutputWorkspace", total)
        }
    }

    /// Numbers the periods of a multiperiod group in place.
    struct TagPeriods;

    impl Algorithm for TagPeriods {
        fn name(&self) -> &'static str {
            "TagPeriods"
        }

        fn summary(&self) -> &'static str {
            "Test fixture"
        }

        fn declare(&self, bag: &mut PropertyBag) -> Result<(), PropertyError> {
            bag.declare(Property::workspace("Workspace", Direction::InOut))
        }

        fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
            for (i, period) in ctx.workspaces_mut("Workspace")?.into_iter().enumerate() {
                period.title = format!("{}#{}", period.title, i + 1);
            }
            Ok(())
        }
    }

    fn add_periods(registry: &WorkspaceRegistry, name: &str, members: &[(&str, f64)]) {
        for (member, fill) in members {
            let mut workspace = Workspace::filled(*member, 2, 1, *fill, 1);
            workspace
                .history_mut()
                .push(InvocationRecord::new("Load", 1, Vec::new()));
            registry.add_or_replace(member, workspace).unwrap();
        }
        registry
            .add_group(name, WorkspaceGroup::multiperiod(members.iter().map(|(m, _)| *m)))
            .unwrap();
    }

    fn with_engine<T>(registry: &WorkspaceRegistry, f: impl FnOnce(&Engine<'_>) -> T) -> T {
        let config = EngineConfig::default();
        let reporter = ProgressReporter::new();
        f(&Engine::new(registry, &config, &reporter))
    }

    fn create(engine: &Engine<'_>, name: &str, spectra: i64, fill: f64) {
        let mut invocation = Invocation::initialized(Box::new(CreateWorkspace)).unwrap();
        invocation.set("OutputWorkspace", name).unwrap();
        invocation.set("NumberOfSpectra", spectra).unwrap();
        invocation.set("BinsPerSpectrum", 2_i64).unwrap();
        invocation.set("Fill", fill).unwrap();
        invocation.execute(engine).unwrap();
    }

    fn plus(lhs: &str, rhs: &str, out: &str) -> Invocation {
        let mut invocation = Invocation::initialized(Box::new(Plus)).unwrap();
        invocation.set("LHSWorkspace", lhs).unwrap();
        invocation.set("RHSWorkspace", rhs).unwrap();
        invocation.set("OutputWorkspace", out).unwrap();
        invocation
    }

    fn scale(input: &str, spec: &str, factor: f64, out: &str) -> Invocation {
        let mut invocation = Invocation::initialized(Box::new(Scale)).unwrap();
        invocation
            .set_compound("InputWorkspace", input, IndexKind::WorkspaceIndex, spec)
            .unwrap();
        invocation.set("Factor", factor).unwrap();
        invocation.set("OutputWorkspace", out).unwrap();
        invocation
    }

    fn concat(first: &str, second: &str, third: Option<&str>, out: &str) -> Invocation {
        concat_failing(first, second, third, out, None)
    }

    fn concat_failing(
        first: &str,
        second: &str,
        third: Option<&str>,
        out: &str,
        fail_on: Option<&'static str>,
    ) -> Invocation {
        let mut invocation = Invocation::initialized(Box::new(ConcatTitles { fail_on })).unwrap();
        invocation.set("First", first).unwrap();
        invocation.set("Second", second).unwrap();
        if let Some(third) = third {
            invocation.set("Third", third).unwrap();
        }
        invocation.set("OutputWorkspace", out).unwrap();
        invocation
    }

    fn add_group(registry: &WorkspaceRegistry, name: &str, members: &[&str]) {
        for member in members {
            registry
                .add_or_replace(member, Workspace::filled(*member, 1, 1, 1.0, 1))
                .unwrap();
        }
        registry
            .add_group(name, WorkspaceGroup::new(members.iter().copied()))
            .unwrap();
    }

    fn title(registry: &WorkspaceRegistry, name: &str) -> String {
        registry.retrieve(name).unwrap().read().title.clone()
    }

    #[test]
    fn same_workspace_as_both_inputs_and_output_completes() {
        let registry = Arc::new(WorkspaceRegistry::new());
        with_engine(&registry, |engine| create(engine, "ws0", 2, 1.5));

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&registry);
        thread::spawn(move || {
            let result = with_engine(&shared, |engine| plus("ws0", "ws0", "ws0").execute(engine));
            let _ = tx.send(result.map(|report| report.mode));
        });

        let mode = rx.recv_timeout(TIMEOUT).expect("invocation deadlocked").unwrap();
        assert_eq!(mode, DispatchMode::Direct);
        let ws = registry.retrieve("ws0").unwrap();
        let ws = ws.read();
        assert_eq!(ws.title, "ws0 + ws0");
        assert!(ws.spectra().iter().all(|s| s.counts == vec![3.0, 3.0]));
        let names: Vec<_> = ws.history().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["CreateWorkspace", "Plus"]);
    }

    #[test]
    fn equal_groups_fan_out_into_numbered_output_group() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2", "A_3"]);
        add_group(&registry, "B", &["B_1", "B_2", "B_3"]);
        add_group(&registry, "C", &["C_1", "C_2", "C_3"]);

        let report = with_engine(&registry, |engine| {
            concat("A", "B", Some("C"), "D").execute(engine)
        })
        .unwrap();

        assert_eq!(report.mode, DispatchMode::GroupFanOut);
        assert_eq!(report.shots, 3);
        assert_eq!(report.outputs["OutputWorkspace"], "D");
        let group = registry.retrieve_group("D").unwrap();
        assert_eq!(group.members(), ["D_1", "D_2", "D_3"]);
        assert_eq!(title(&registry, "D_2"), "A_2B_2C_2");
    }

    #[test]
    fn group_size_mismatch_fails_before_any_member_runs() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2", "A_3"]);
        add_group(&registry, "B", &["B_1", "B_2", "B_3", "B_4"]);

        let mut invocation = concat("A", "B", None, "D");
        let err = with_engine(&registry, |engine| invocation.execute(engine)).unwrap_err();

        assert!(matches!(err, EngineError::GroupSizeMismatch { .. }));
        assert!(!registry.exists("D"));
        assert!(!registry.exists("D_1"));
        assert_eq!(invocation.state(), ExecutionState::Initialized);
        assert_eq!(invocation.result_state(), ResultState::NotFinished);
    }

    #[test]
    fn single_member_groups_produce_single_member_output() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1"]);
        add_group(&registry, "B", &["B_1"]);
        registry
            .add_or_replace("scalar", Workspace::filled("S", 1, 1, 1.0, 1))
            .unwrap();

        with_engine(&registry, |engine| concat("A", "B", Some("scalar"), "D").execute(engine))
            .unwrap();

        let group = registry.retrieve_group("D").unwrap();
        assert_eq!(group.members(), ["D_1"]);
        assert_eq!(title(&registry, "D_1"), "A_1B_1S");
    }

    #[test]
    fn single_member_group_is_broadcast_against_larger_group() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2"]);
        add_group(&registry, "X", &["X_1"]);

        with_engine(&registry, |engine| concat("A", "X", None, "D").execute(engine)).unwrap();

        assert_eq!(registry.retrieve_group("D").unwrap().len(), 2);
        assert_eq!(title(&registry, "D_2"), "A_2X_1");
    }

    #[test]
    fn fan_out_stops_at_first_failing_member() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2", "A_3"]);
        add_group(&registry, "B", &["B_1", "B_2", "B_3"]);

        let mut invocation = concat_failing("A", "B", None, "D", Some("A_2"));
        let err = with_engine(&registry, |engine| invocation.execute(engine)).unwrap_err();

        match &err {
            EngineError::MemberExecutionFailure { index, member, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(member, "A_2");
            }
            other => panic!("expected member failure, got {other}"),
        }
        assert!(err.to_string().contains("A_2"));
        assert!(err.to_string().ends_with("refusing to process A_2"));
        assert!(registry.exists("D_1"));
        assert!(!registry.exists("D_3"));
        assert!(!registry.exists("D"));
        assert_eq!(invocation.state(), ExecutionState::Failed);
        assert_eq!(invocation.result_state(), ResultState::Failed);
    }

    #[test]
    fn rerunning_over_a_group_in_place_keeps_member_names() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "D", &["D1", "D2"]);

        let report = with_engine(&registry, |engine| scale("D", "", 2.0, "D").execute(engine))
            .unwrap();

        assert_eq!(report.shots, 2);
        assert_eq!(registry.retrieve_group("D").unwrap().members(), ["D1", "D2"]);
        let d1 = registry.retrieve("D1").unwrap();
        assert_eq!(d1.read().spectra()[0].counts, vec![2.0]);
        assert_eq!(d1.read().history().len(), 1);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn in_place_run_preserves_history_and_appends_once() {
        let registry = WorkspaceRegistry::new();
        with_engine(&registry, |engine| {
            create(engine, "ws", 3, 1.0);
            let before = registry.retrieve("ws").unwrap();
            scale("ws", "0-1", 4.0, "ws").execute(engine).unwrap();
            let after = registry.retrieve("ws").unwrap();

            assert!(before.ptr_eq(&after));
            let ws = after.read();
            assert_eq!(ws.history().len(), 2);
            assert_eq!(ws.history().last().unwrap().name, "Scale");
            assert_eq!(ws.history().last().unwrap().property("Factor"), Some("4"));
            assert_eq!(ws.spectra()[1].counts, vec![4.0, 4.0]);
            assert_eq!(ws.spectra()[2].counts, vec![1.0, 1.0]);
        });
    }

    #[test]
    fn fresh_output_history_is_union_of_inputs_plus_one() {
        let registry = WorkspaceRegistry::new();
        with_engine(&registry, |engine| {
            create(engine, "lhs", 2, 1.0);
            create(engine, "rhs", 2, 2.0);
            scale("rhs", "", 2.0, "rhs").execute(engine).unwrap();
            plus("lhs", "rhs", "sum").execute(engine).unwrap();
        });

        let sum = registry.retrieve("sum").unwrap();
        let sum = sum.read();
        let names: Vec<_> = sum.history().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["CreateWorkspace", "CreateWorkspace", "Scale", "Plus"]);
        assert_eq!(sum.title, "lhs + rhs");
        assert_eq!(sum.spectra()[0].counts, vec![5.0, 5.0]);
        assert_eq!(registry.retrieve("lhs").unwrap().read().history().len(), 1);
    }

    #[test]
    fn scaling_into_new_output_leaves_input_untouched() {
        let registry = WorkspaceRegistry::new();
        with_engine(&registry, |engine| {
            create(engine, "in", 4, 1.0);
            let mut invocation = scale("in", "", 3.0, "out");
            invocation
                .set_compound("InputWorkspace", "in", IndexKind::SpectrumNumber, "2,4")
                .unwrap();
            invocation.execute(engine).unwrap();
        });

        let out = registry.retrieve("out").unwrap();
        let counts: Vec<_> = out.read().spectra().iter().map(|s| s.counts[0]).collect();
        assert_eq!(counts, vec![1.0, 3.0, 1.0, 3.0]);
        assert_eq!(out.read().history().len(), 2);
        let input = registry.retrieve("in").unwrap();
        assert!(input.read().spectra().iter().all(|s| s.counts[0] == 1.0));
    }

    #[test]
    fn disabled_history_leaves_outputs_untouched() {
        let registry = WorkspaceRegistry::new();
        registry
            .add_or_replace("ws", Workspace::filled("ws", 1, 1, 1.0, 1))
            .unwrap();
        let config = EngineConfig {
            record_history: false,
            ..EngineConfig::default()
        };
        let reporter = ProgressReporter::new();
        let engine = Engine::new(&registry, &config, &reporter);

        scale("ws", "", 2.0, "ws").execute(&engine).unwrap();
        let ws = registry.retrieve("ws").unwrap();
        assert!(ws.read().history().is_empty());
        assert_eq!(ws.read().spectra()[0].counts, vec![2.0]);
    }

    #[test]
    fn validation_failure_keeps_invocation_initialized() {
        let registry = WorkspaceRegistry::new();
        let mut invocation = scale("missing", "", f64::INFINITY, "out");
        let err = with_engine(&registry, |engine| invocation.execute(engine)).unwrap_err();

        let EngineError::ValidationFailure(failures) = err else {
            panic!("expected validation failure");
        };
        assert!(failures.contains_key("InputWorkspace"));
        assert!(failures.contains_key("Factor"));
        assert_eq!(invocation.state(), ExecutionState::Initialized);
        assert_eq!(invocation.result_state(), ResultState::NotFinished);
    }

    #[test]
    fn shape_mismatch_is_reported_by_cross_property_check() {
        let registry = WorkspaceRegistry::new();
        let err = with_engine(&registry, |engine| {
            create(engine, "two", 2, 1.0);
            create(engine, "three", 3, 1.0);
            plus("two", "three", "sum").execute(engine)
        })
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ValidationFailure(ref failures) if failures.contains_key("RHSWorkspace")
        ));
    }

    #[test]
    fn panicking_body_fails_and_releases_locks() {
        let registry = WorkspaceRegistry::new();
        registry
            .add_or_replace("ws", Workspace::filled("ws", 1, 1, 1.0, 1))
            .unwrap();

        let mut invocation = Invocation::initialized(Box::new(Panicking)).unwrap();
        invocation.set("Workspace", "ws").unwrap();
        let err = with_engine(&registry, |engine| invocation.execute(engine)).unwrap_err();

        assert!(matches!(err, EngineError::Panicked(ref message) if message == "body exploded"));
        assert_eq!(invocation.state(), ExecutionState::Failed);
        assert!(registry.retrieve("ws").unwrap().try_write_owned().is_some());
    }

    #[test]
    fn invocation_can_run_again_after_finishing() {
        let registry = WorkspaceRegistry::new();
        with_engine(&registry, |engine| {
            create(engine, "ws", 1, 1.0);
            let mut invocation = scale("ws", "", 2.0, "ws");
            invocation.execute(engine).unwrap();
            assert_eq!(invocation.state(), ExecutionState::Finished);
            invocation.execute(engine).unwrap();
            assert!(invocation.is_executed());
        });
        let ws = registry.retrieve("ws").unwrap();
        assert_eq!(ws.read().spectra()[0].counts, vec![4.0, 4.0]);
        assert_eq!(ws.read().history().len(), 3);
    }

    #[test]
    fn uninitialized_invocation_cannot_execute() {
        let registry = WorkspaceRegistry::new();
        let mut invocation = Invocation::new(Box::new(Plus));
        let err = with_engine(&registry, |engine| invocation.execute(engine)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidState {
                state: ExecutionState::Uninitialized,
                ..
            }
        ));
        assert!(matches!(
            invocation.set("LHSWorkspace", "a"),
            Err(EngineError::InvalidState { .. })
        ));
        invocation.initialize().unwrap();
        assert!(matches!(
            invocation.initialize(),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn missing_mandatory_output_fails_execution() {
        struct Forgetful;

        impl Algorithm for Forgetful {
            fn name(&self) -> &'static str {
                "Forgetful"
            }

            fn summary(&self) -> &'static str {
                "Test fixture"
            }

            fn declare(&self, bag: &mut PropertyBag) -> Result<(), PropertyError> {
                bag.declare(Property::workspace("OutputWorkspace", Direction::Output))
            }

            fn exec(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
                Ok(())
            }
        }

        let registry = WorkspaceRegistry::new();
        let mut invocation = Invocation::initialized(Box::new(Forgetful)).unwrap();
        invocation.set("OutputWorkspace", "never").unwrap();
        let err = with_engine(&registry, |engine| invocation.execute(engine)).unwrap_err();
        assert!(err.to_string().contains("was not produced"));
        assert!(!registry.exists("never"));
    }

    #[test]
    fn concurrent_readers_do_not_block_each_other() {
        let registry = Arc::new(WorkspaceRegistry::new());
        with_engine(&registry, |engine| create(engine, "shared", 2, 1.0));
        let _reader = registry.retrieve("shared").unwrap().read_owned();

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&registry);
        thread::spawn(move || {
            let result =
                with_engine(&shared, |engine| plus("shared", "shared", "sum").execute(engine));
            let _ = tx.send(result.is_ok());
        });

        assert!(rx.recv_timeout(TIMEOUT).expect("reader was blocked"));
    }

    #[test]
    fn writer_waits_for_reader_to_finish() {
        let registry = Arc::new(WorkspaceRegistry::new());
        with_engine(&registry, |engine| create(engine, "shared", 2, 1.0));
        let reader = registry.retrieve("shared").unwrap().read_owned();

        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&registry);
        thread::spawn(move || {
            let result = with_engine(&shared, |engine| {
                scale("shared", "", 2.0, "shared").execute(engine)
            });
            let _ = tx.send(result.is_ok());
        });

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        drop(reader);
        assert!(rx.recv_timeout(TIMEOUT).expect("writer never resumed"));
    }

    #[test]
    fn crossed_read_write_sets_do_not_deadlock() {
        let registry = Arc::new(WorkspaceRegistry::new());
        with_engine(&registry, |engine| {
            create(engine, "a", 2, 1.0);
            create(engine, "b", 2, 1.0);
        });

        let (tx, rx) = mpsc::channel();
        for (input, output) in [("a", "b"), ("b", "a")] {
            let shared = Arc::clone(&registry);
            let tx = tx.clone();
            thread::spawn(move || {
                let ok = with_engine(&shared, |engine| {
                    (0..50).all(|_| scale(input, "", 1.0, output).execute(engine).is_ok())
                });
                let _ = tx.send(ok);
            });
        }

        for _ in 0..2 {
            assert!(rx.recv_timeout(TIMEOUT).expect("crossed invocations deadlocked"));
        }
    }

    #[test]
    fn multiperiod_input_is_read_as_one_dataset() {
        let registry = WorkspaceRegistry::new();
        add_periods(&registry, "periods", &[("p1", 1.0), ("p2", 2.0)]);

        let mut invocation = Invocation::initialized(Box::new(SumPeriods)).unwrap();
        invocation.set("InputWorkspace", "periods").unwrap();
        invocation.set("OutputWorkspace", "total").unwrap();
        let report = with_engine(&registry, |engine| invocation.execute(engine)).unwrap();

        assert_eq!(report.mode, DispatchMode::Direct);
        assert_eq!(report.shots, 1);
        let total = registry.retrieve("total").unwrap();
        let total = total.read();
        assert_eq!(total.title, "p1+p2");
        assert_eq!(total.spectra()[1].counts, vec![3.0]);
        let names: Vec<_> = total.history().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Load", "Load", "SumPeriods"]);
        assert!(registry.retrieve("p1").unwrap().try_write_owned().is_some());
    }

    #[test]
    fn multiperiod_group_is_updated_in_place() {
        let registry = WorkspaceRegistry::new();
        add_periods(&registry, "periods", &[("p1", 1.0), ("p2", 1.0)]);

        let mut invocation = Invocation::initialized(Box::new(TagPeriods)).unwrap();
        invocation.set("Workspace", "periods").unwrap();
        let report = with_engine(&registry, |engine| invocation.execute(engine)).unwrap();

        assert_eq!(report.outputs["Workspace"], "periods");
        assert_eq!(title(&registry, "p1"), "p1#1");
        assert_eq!(title(&registry, "p2"), "p2#2");
        for member in ["p1", "p2"] {
            let handle = registry.retrieve(member).unwrap();
            let names: Vec<_> = handle
                .read()
                .history()
                .iter()
                .map(|r| r.name.clone())
                .collect();
            assert_eq!(names, ["Load", "TagPeriods"]);
        }
        assert!(registry.retrieve_group("periods").unwrap().is_multiperiod());
    }

    #[test]
    fn single_workspace_cannot_replace_multiperiod_output() {
        let registry = WorkspaceRegistry::new();
        add_periods(&registry, "periods", &[("p1", 1.0), ("p2", 1.0)]);
        registry
            .add_or_replace("x", Workspace::filled("x", 2, 1, 1.0, 1))
            .unwrap();

        let mut invocation = concat("x", "x", None, "periods");
        let err = with_engine(&registry, |engine| invocation.execute(engine)).unwrap_err();

        assert!(err.to_string().contains("multiperiod group 'periods'"));
        assert_eq!(title(&registry, "p1"), "p1");
        assert!(registry.retrieve_group("periods").is_ok());
    }

    #[test]
    fn fan_out_closes_its_task_when_a_member_panics() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2"]);

        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let reporter = ProgressReporter::with_callback(Box::new(move |event| {
            sink.lock().unwrap().push(event);
        }));
        let config = EngineConfig::default();
        let engine = Engine::new(&registry, &config, &reporter);

        let mut invocation = Invocation::initialized(Box::new(Panicking)).unwrap();
        invocation.set("Workspace", "A").unwrap();
        let err = invocation.execute(&engine).unwrap_err();
        assert!(matches!(err, EngineError::Panicked(_)));

        let events = events.lock().unwrap();
        let starts = events
            .iter()
            .filter(|e| matches!(e, Progress::TaskStart { .. }))
            .count();
        let finishes = events
            .iter()
            .filter(|e| matches!(e, Progress::TaskFinish))
            .count();
        assert_eq!((starts, finishes), (1, 1));
        assert!(matches!(events.last(), Some(Progress::TaskFinish)));
        assert!(registry.retrieve("A_1").unwrap().try_write_owned().is_some());
    }

    #[test]
    fn fan_out_reports_one_step_per_member() {
        let registry = WorkspaceRegistry::new();
        add_group(&registry, "A", &["A_1", "A_2"]);
        add_group(&registry, "B", &["B_1", "B_2"]);

        let increments = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&increments);
        let reporter = ProgressReporter::with_callback(Box::new(move |event| {
            if matches!(event, Progress::TaskIncrement) {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }));
        let config = EngineConfig::default();
        let engine = Engine::new(&registry, &config, &reporter);

        concat("A", "B", None, "D").execute(&engine).unwrap();
        assert_eq!(increments.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}

//! Session driver: one explicit object owning the plan, phase machine and
//! graph of a single CTM run.
//!
//! Every `step` follows the same shape:
//!
//! ```text
//! compute topology (pure) → one RemoteSync call (await) → mutate graph → advance
//! ```
//!
//! The await is the only suspension point. If the call fails the step
//! returns before anything is mutated, so the same step can be replayed.
//! `step` takes `&mut self`, which rules out two steps in flight on one
//! session.

use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, info, warn};

use crate::config::SessionConfig;
use crate::graph::{GraphAccumulator, is_layer_zero, neighborhood_relations};
use crate::model::*;
use crate::phase::{Phase, PhaseMachine};
use crate::plan::LayerPlan;
use crate::sync::{EmitUpdate, ReduceUpdate, RemoteSync};
use crate::tournament::{BuiltLayer, build_layer_from};
use crate::{Error, Result};

/// What one step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub phase: Phase,
    /// REDUCE round, 0 elsewhere.
    pub round: u32,
    pub cycle: u64,
    pub entities_added: usize,
    pub relations_added: usize,
    pub relations_reversed: usize,
    /// Phase the next step will run.
    pub next: Phase,
}

/// Serializable position of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// `Phase::code()` of the phase the next step runs.
    pub phase: u8,
    pub round: u32,
    pub cycle: u64,
    pub inputs: Vec<EntityId>,
}

/// A CTM session bound to one backend.
pub struct Session<S: RemoteSync> {
    config: SessionConfig,
    sync: S,
    plan: Option<LayerPlan>,
    machine: PhaseMachine,
    graph: GraphAccumulator,
    /// Layer-0 ids in left-to-right order.
    inputs: Vec<EntityId>,
}

impl<S: RemoteSync> Session<S> {
    /// A fresh session at PREPARE.
    pub fn new(config: SessionConfig, sync: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sync,
            plan: None,
            machine: PhaseMachine::new(),
            graph: GraphAccumulator::new(),
            inputs: Vec::new(),
        })
    }

    /// Rebuild a session from a snapshot.
    ///
    /// The graph is regenerated from the plan; winner labels and
    /// neighborhood relations come back with the next REDUCE and RELINK.
    pub fn restore(config: SessionConfig, sync: S, snapshot: SessionSnapshot) -> Result<Self> {
        let phase = Phase::try_from(snapshot.phase)?;
        let mut session = Self::new(config, sync)?;
        if phase == Phase::Prepare {
            return Ok(session);
        }

        if snapshot.inputs.len() != session.config.requested_count() {
            return Err(Error::Config(format!(
                "snapshot has {} inputs, config expects {}",
                snapshot.inputs.len(),
                session.config.requested_count()
            )));
        }
        check_inputs(&snapshot.inputs)?;

        let plan = LayerPlan::new(snapshot.inputs.len())?;
        let rounds = plan.reduce_rounds();
        if phase == Phase::Reduce && !(1..=rounds).contains(&snapshot.round) {
            return Err(Error::UnknownPhase(format!("{phase}({})", snapshot.round)));
        }

        session.graph = replay_graph(&plan, &snapshot.inputs, phase, snapshot.round)?;
        session.machine = PhaseMachine::resume(phase, snapshot.round, rounds, snapshot.cycle);
        session.inputs = snapshot.inputs;
        session.plan = Some(plan);
        info!(%phase, round = snapshot.round, "session restored");
        Ok(session)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.machine.phase().code(),
            round: self.machine.round(),
            cycle: self.machine.cycle(),
            inputs: self.inputs.clone(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn round(&self) -> u32 {
        self.machine.round()
    }

    pub fn cycle(&self) -> u64 {
        self.machine.cycle()
    }

    pub fn graph(&self) -> &GraphAccumulator {
        &self.graph
    }

    pub fn plan(&self) -> Option<&LayerPlan> {
        self.plan.as_ref()
    }

    pub fn inputs(&self) -> &[EntityId] {
        &self.inputs
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sync(&self) -> &S {
        &self.sync
    }

    /// The merged output entity, once FINALIZE has run this cycle.
    ///
    /// With a single input the tournament is already decided and that input
    /// is the output.
    pub fn terminal(&self) -> Option<&Entity> {
        match self.plan.as_ref() {
            Some(plan) if plan.layer_count() == 1 => self.graph.entities().first(),
            _ => self.graph.terminal(),
        }
    }

    /// Backend detail for one entity.
    pub async fn inspect(&self, id: &EntityId) -> Result<serde_json::Value> {
        self.sync.fetch_entity_detail(id).await
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Run the current phase and advance.
    pub async fn step(&mut self) -> Result<StepReport> {
        let phase = self.machine.phase();
        let round = self.machine.round();
        let span = tracing::debug_span!("step", %phase, round);
        self.run_phase(phase, round).instrument(span).await
    }

    /// `step`, retrying transient sync failures up to the configured budget.
    pub async fn step_with_retry(&mut self) -> Result<StepReport> {
        let attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.step().await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "step failed, retrying");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn run_phase(&mut self, phase: Phase, round: u32) -> Result<StepReport> {
        let mut report = StepReport {
            phase,
            round,
            cycle: self.machine.cycle(),
            entities_added: 0,
            relations_added: 0,
            relations_reversed: 0,
            next: phase,
        };

        let outcome = match phase {
            Phase::Prepare => self.prepare(&mut report).await,
            Phase::Emit => self.emit().await,
            Phase::Reduce => self.reduce(round, &mut report).await,
            Phase::Finalize => self.finalize(&mut report).await,
            Phase::Broadcast => self.broadcast(&mut report).await,
            Phase::Relink => self.relink(&mut report).await,
        };
        // Failed steps leave phase, round and graph untouched.
        outcome.inspect_err(|e| warn!(%phase, round, error = %e, "step failed"))?;

        report.next = self.machine.advance();
        info!(%phase, round, next = %report.next, "phase complete");
        Ok(report)
    }

    async fn prepare(&mut self, report: &mut StepReport) -> Result<()> {
        let count = self.config.requested_count();
        let ids = self.sync.init_entities(count, &self.config.kinds).await?;
        check_inputs(&ids)?;
        let plan = LayerPlan::new(ids.len())?;
        debug!(sizes = ?plan.sizes(), "layer plan");

        self.graph.clear();
        self.graph.append(ids.iter().cloned().map(Entity::input), []);
        self.machine.set_total_rounds(plan.reduce_rounds());
        report.entities_added = ids.len();
        self.inputs = ids;
        self.plan = Some(plan);
        Ok(())
    }

    async fn emit(&mut self) -> Result<()> {
        let slots = self.require_plan()?.layer_ids(0)?;
        let updates: Vec<EmitUpdate> = self
            .inputs
            .iter()
            .zip(slots)
            .map(|(source, target)| EmitUpdate { source: source.clone(), target })
            .collect();
        self.sync.emit(&updates).await
    }

    async fn reduce(&mut self, round: u32, report: &mut StepReport) -> Result<()> {
        let layer = round as usize;
        let built = self.build(layer)?;
        let updates: Vec<ReduceUpdate> = built
            .pairings
            .iter()
            .map(|p| ReduceUpdate { target: p.target.clone(), parents: p.sources.clone() })
            .collect();

        let ack = self.sync.reduce(round, &updates).await?;

        let entities: Vec<Entity> = built
            .entities
            .iter()
            .map(|id| {
                let entity = Entity::reduction(id.clone(), layer);
                match ack.winners.get(id) {
                    Some(w) => self.with_winner(entity, w),
                    None => entity,
                }
            })
            .collect();
        self.commit(built, entities, report);
        Ok(())
    }

    async fn finalize(&mut self, report: &mut StepReport) -> Result<()> {
        let payload = self.config.finalize_payload.clone();
        let layer = self.require_plan()?.terminal_layer();

        if layer == 0 {
            // Already decided: the single input is the output.
            let target = self.inputs.first().cloned().ok_or(Error::InvalidEntityCount(0))?;
            self.sync.finalize(&target, &[], &payload).await?;
            return Ok(());
        }

        let built = self.build(layer)?;
        let target = built.entities[0].clone();
        let parents: Vec<EntityId> = built.pairings[0].sources.to_vec();

        let ack = self.sync.finalize(&target, &parents, &payload).await?;

        let terminal = Entity::terminal(target, layer);
        let terminal = match &ack.winner {
            Some(w) => self.with_winner(terminal, w),
            None => terminal,
        };
        self.commit(built, vec![terminal], report);
        Ok(())
    }

    async fn broadcast(&mut self, report: &mut StepReport) -> Result<()> {
        self.sync.broadcast().await?;
        report.relations_reversed = self.graph.reverse_all(Relation::is_neighborhood);
        Ok(())
    }

    async fn relink(&mut self, report: &mut StepReport) -> Result<()> {
        let mapping = self.sync.relink().await?;
        let fresh = neighborhood_relations(&mapping, &self.inputs);

        self.graph.reset_to(is_layer_zero);
        report.relations_added = fresh.len();
        self.graph.replace_neighborhood(fresh);
        info!(
            cycle = self.machine.cycle() + 1,
            inputs = self.inputs.len(),
            links = report.relations_added,
            "cycle reset"
        );
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn require_plan(&self) -> Result<&LayerPlan> {
        self.plan
            .as_ref()
            .ok_or_else(|| Error::NotFound("layer plan (PREPARE has not run)".into()))
    }

    /// Topology of `layer`, pairing the inputs themselves for layer 1.
    fn build(&self, layer: usize) -> Result<BuiltLayer> {
        let plan = self.require_plan()?;
        let previous = previous_layer_ids(plan, &self.inputs, layer)?;
        let built = build_layer_from(plan.sizes(), layer, &previous)?;
        debug!(layer, entities = built.entities.len(), "built layer");
        Ok(built)
    }

    fn with_winner(&self, entity: Entity, winner: &EntityId) -> Entity {
        let label = self
            .graph
            .entity(winner)
            .map(|e| e.label.clone())
            .unwrap_or_else(|| winner.to_string());
        entity.with_winner(winner.clone(), &label)
    }

    fn commit(&mut self, built: BuiltLayer, entities: Vec<Entity>, report: &mut StepReport) {
        let relations = built.relations();
        report.entities_added = entities.len();
        report.relations_added = relations.len();
        self.graph.append(entities, relations);
    }
}

/// Input ids must be unique and must not read as sequence ids.
fn check_inputs(inputs: &[EntityId]) -> Result<()> {
    let mut seen = hashbrown::HashSet::with_capacity(inputs.len());
    for id in inputs {
        if id.is_reserved_name() {
            return Err(Error::Config(format!("input name '{id}' collides with a sequence id")));
        }
        if !seen.insert(id) {
            return Err(Error::Config(format!("duplicate input '{id}'")));
        }
    }
    Ok(())
}

fn previous_layer_ids(plan: &LayerPlan, inputs: &[EntityId], layer: usize) -> Result<Vec<EntityId>> {
    match layer {
        0 => Err(Error::LayerIndexOutOfRange { layer, layers: plan.layer_count() }),
        1 => Ok(inputs.to_vec()),
        _ => plan.layer_ids(layer - 1),
    }
}

/// Regenerate the graph a session holds right before running `phase`.
fn replay_graph(
    plan: &LayerPlan,
    inputs: &[EntityId],
    phase: Phase,
    round: u32,
) -> Result<GraphAccumulator> {
    let mut graph = GraphAccumulator::new();
    graph.append(inputs.iter().cloned().map(Entity::input), []);

    let built_through = match phase {
        Phase::Prepare | Phase::Emit => 0,
        Phase::Reduce => round as usize - 1,
        Phase::Finalize => plan.reduce_rounds() as usize,
        Phase::Broadcast | Phase::Relink => plan.terminal_layer(),
    };
    for layer in 1..=built_through {
        let previous = previous_layer_ids(plan, inputs, layer)?;
        let built = build_layer_from(plan.sizes(), layer, &previous)?;
        let terminal = layer == plan.terminal_layer();
        let entities = built.entities.iter().map(|id| {
            if terminal { Entity::terminal(id.clone(), layer) } else { Entity::reduction(id.clone(), layer) }
        });
        graph.append(entities, built.relations());
    }
    if phase == Phase::Relink {
        graph.reverse_all(Relation::is_neighborhood);
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_graph_matches_phase() {
        let plan = LayerPlan::new(6).unwrap();
        let inputs: Vec<EntityId> = (1..=6).map(|i| EntityId::named(format!("P_{i}"))).collect();

        let g = replay_graph(&plan, &inputs, Phase::Reduce, 2).unwrap();
        assert_eq!(g.depth(), 1);
        assert_eq!(g.entities().len(), 9);

        let g = replay_graph(&plan, &inputs, Phase::Broadcast, 0).unwrap();
        assert_eq!(g.entities().len(), 12);
        assert!(g.terminal().is_some());
        assert_eq!(g.relations()[0].source, inputs[0]);

        let g = replay_graph(&plan, &inputs, Phase::Relink, 0).unwrap();
        assert_eq!(g.relations()[0].target, inputs[0]);
    }

    #[test]
    fn test_check_inputs() {
        let ok: Vec<EntityId> = vec!["VisionProcessor_1".into(), "AudioProcessor_1".into()];
        assert!(check_inputs(&ok).is_ok());

        let dup: Vec<EntityId> = vec!["a".into(), "b".into(), "a".into()];
        assert!(matches!(check_inputs(&dup), Err(Error::Config(_))));

        let reserved: Vec<EntityId> = vec!["a".into(), "n4".into()];
        assert!(matches!(check_inputs(&reserved), Err(Error::Config(_))));
    }

    #[test]
    fn test_previous_layer_ids() {
        let plan = LayerPlan::new(3).unwrap();
        let inputs: Vec<EntityId> = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(previous_layer_ids(&plan, &inputs, 1).unwrap(), inputs);
        assert_eq!(
            previous_layer_ids(&plan, &inputs, 2).unwrap(),
            vec![EntityId::seq(4), EntityId::seq(5)]
        );
        assert!(previous_layer_ids(&plan, &inputs, 0).is_err());
    }
}

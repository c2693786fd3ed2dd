//! Validates a flat [`Pipeline`] into a cycle-free structure with computed
//! parallelism levels.
//!
//! Grounded on `fluent-pipeline::Pipeline::validate()` (which checks
//! structural invariants over a `petgraph::DiGraph`), but the graph here is
//! derived purely from each step's `dependencies` list rather than an
//! explicit node/edge builder — there is no `Node` kind enum and no edge
//! adapter, just steps plus the ids they depend on.

use std::collections::{HashMap, HashSet};

use cascade_core::error::ConfigurationError;
use cascade_core::types::{Pipeline, PipelineStep, StepId};
use petgraph::graph::{DiGraph, NodeIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// A validated, acyclic pipeline: every dependency id resolves, no step id
/// repeats, and no cycle exists. Carries the `petgraph` graph used for
/// level computation and the scheduler's readiness queries.
pub struct Dag {
    pub pipeline_id: String,
    steps: Vec<PipelineStep>,
    index_of: HashMap<StepId, usize>,
    graph: DiGraph<StepId, ()>,
    node_of: HashMap<StepId, NodeIndex>,
}

impl Dag {
    /// Validates `pipeline` and builds its graph. Fails on duplicate step
    /// ids, dependencies naming a step that doesn't exist, or any cycle
    /// (including a one-node self-dependency).
    pub fn build(pipeline: Pipeline) -> Result<Self, ConfigurationError> {
        if pipeline.steps.is_empty() {
            return Err(ConfigurationError::EmptyPipeline);
        }

        let mut index_of = HashMap::with_capacity(pipeline.steps.len());
        for (i, step) in pipeline.steps.iter().enumerate() {
            if index_of.insert(step.id.clone(), i).is_some() {
                return Err(ConfigurationError::DuplicateStepId(step.id.clone()));
            }
        }

        for step in &pipeline.steps {
            for dep in &step.dependencies {
                if !index_of.contains_key(dep) {
                    return Err(ConfigurationError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut graph = DiGraph::new();
        let mut node_of = HashMap::with_capacity(pipeline.steps.len());
        for step in &pipeline.steps {
            node_of.insert(step.id.clone(), graph.add_node(step.id.clone()));
        }
        for step in &pipeline.steps {
            let to = node_of[&step.id];
            for dep in &step.dependencies {
                let from = node_of[dep];
                graph.add_edge(from, to, ());
            }
        }

        if let Some(cycle) = find_cycle(&pipeline.steps, &index_of) {
            return Err(ConfigurationError::CycleDetected(cycle));
        }

        Ok(Self {
            pipeline_id: pipeline.id,
            steps: pipeline.steps,
            index_of,
            graph,
            node_of,
        })
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&PipelineStep> {
        self.index_of.get(id).map(|&i| &self.steps[i])
    }

    pub fn dependencies_of(&self, id: &str) -> &[StepId] {
        self.index_of
            .get(id)
            .map(|&i| self.steps[i].dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Steps that depend (directly) on `id`.
    pub fn dependents_of<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a PipelineStep> + 'a {
        self.steps.iter().filter(move |s| s.dependencies.iter().any(|d| d == id))
    }

    /// Every step reachable downstream of `id`, transitively, via a BFS
    /// over the graph — used by the scheduler's cascade-skip propagation.
    pub fn transitive_dependents_of(&self, id: &str) -> HashSet<StepId> {
        let mut seen = HashSet::new();
        let mut queue = vec![id.to_string()];
        while let Some(current) = queue.pop() {
            for dependent in self.dependents_of(&current) {
                if seen.insert(dependent.id.clone()) {
                    queue.push(dependent.id.clone());
                }
            }
        }
        seen
    }

    /// Groups step ids by topological level: leaves (no dependencies) sit
    /// at level 0, every other step is `1 + max(level of its dependencies)`.
    /// Steps at the same level can run in parallel; consumers needing the
    /// raw per-step levels can read [`Dag::level_of`].
    pub fn levels(&self) -> Vec<Vec<StepId>> {
        let levels = self.compute_levels();
        let max_level = levels.values().copied().max().unwrap_or(0);
        let mut grouped = vec![Vec::new(); max_level + 1];
        for step in &self.steps {
            grouped[levels[&step.id]].push(step.id.clone());
        }
        grouped
    }

    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.compute_levels().get(id).copied()
    }

    fn compute_levels(&self) -> HashMap<StepId, usize> {
        let mut levels: HashMap<StepId, usize> = HashMap::with_capacity(self.steps.len());
        // `self.steps` is not necessarily in dependency order, so resolve
        // recursively with memoization rather than a single linear pass.
        for step in &self.steps {
            self.level_of_recursive(&step.id, &mut levels);
        }
        levels
    }

    fn level_of_recursive(&self, id: &str, levels: &mut HashMap<StepId, usize>) -> usize {
        if let Some(&level) = levels.get(id) {
            return level;
        }
        let deps = self.dependencies_of(id).to_vec();
        let level = deps
            .iter()
            .map(|dep| 1 + self.level_of_recursive(dep, levels))
            .max()
            .unwrap_or(0);
        levels.insert(id.to_string(), level);
        level
    }
}

/// Three-color DFS cycle detection. Returns the cycle path, sliced from
/// the point where a GRAY node is re-encountered, the moment one is found.
/// A step depending on itself reports as a one-element cycle.
fn find_cycle(steps: &[PipelineStep], index_of: &HashMap<StepId, usize>) -> Option<Vec<StepId>> {
    let mut color = vec![Color::White; steps.len()];
    let mut stack: Vec<StepId> = Vec::new();

    fn visit(
        id: &StepId,
        steps: &[PipelineStep],
        index_of: &HashMap<StepId, usize>,
        color: &mut [Color],
        stack: &mut Vec<StepId>,
    ) -> Option<Vec<StepId>> {
        let i = index_of[id];
        color[i] = Color::Gray;
        stack.push(id.clone());

        for dep in &steps[i].dependencies {
            let dep_idx = index_of[dep];
            match color[dep_idx] {
                Color::White => {
                    if let Some(cycle) = visit(dep, steps, index_of, color, stack) {
                        return Some(cycle);
                    }
                }
                Color::Gray => {
                    let start = stack.iter().position(|s| s == dep).unwrap_or(0);
                    let mut cycle: Vec<StepId> = stack[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                Color::Black => {}
            }
        }

        stack.pop();
        color[i] = Color::Black;
        None
    }

    for step in steps {
        if color[index_of[&step.id]] == Color::White {
            if let Some(cycle) = visit(&step.id, steps, index_of, &mut color, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> PipelineStep {
        PipelineStep::new(id, "noop").depends_on(deps.iter().map(|s| s.to_string()))
    }

    #[test]
    fn linear_chain_has_increasing_levels() {
        let pipeline = Pipeline::new("p", vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])]);
        let dag = Dag::build(pipeline).unwrap();
        assert_eq!(dag.level_of("a"), Some(0));
        assert_eq!(dag.level_of("b"), Some(1));
        assert_eq!(dag.level_of("c"), Some(2));
    }

    #[test]
    fn diamond_shares_level_for_parallel_branches() {
        let pipeline = Pipeline::new(
            "p",
            vec![
                step("a", &[]),
                step("b", &["a"]),
                step("c", &["a"]),
                step("d", &["b", "c"]),
            ],
        );
        let dag = Dag::build(pipeline).unwrap();
        assert_eq!(dag.level_of("b"), dag.level_of("c"));
        assert_eq!(dag.level_of("d"), Some(dag.level_of("b").unwrap() + 1));
        let levels = dag.levels();
        assert_eq!(levels[0], vec!["a".to_string()]);
        assert_eq!(levels[1].len(), 2);
    }

    #[test]
    fn self_dependency_is_a_one_node_cycle() {
        let pipeline = Pipeline::new("p", vec![step("a", &["a"])]);
        let err = Dag::build(pipeline).unwrap_err();
        match err {
            ConfigurationError::CycleDetected(cycle) => assert_eq!(cycle, vec!["a", "a"]),
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn three_node_cycle_is_detected() {
        let pipeline = Pipeline::new("p", vec![step("a", &["c"]), step("b", &["a"]), step("c", &["b"])]);
        assert!(matches!(
            Dag::build(pipeline).unwrap_err(),
            ConfigurationError::CycleDetected(_)
        ));
    }

    #[test]
    fn unknown_dependency_names_both_ids() {
        let pipeline = Pipeline::new("p", vec![step("a", &["missing"])]);
        match Dag::build(pipeline).unwrap_err() {
            ConfigurationError::UnknownDependency { step, dependency } => {
                assert_eq!(step, "a");
                assert_eq!(dependency, "missing");
            }
            other => panic!("expected UnknownDependency, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let pipeline = Pipeline::new("p", vec![step("a", &[]), step("a", &[])]);
        assert!(matches!(
            Dag::build(pipeline).unwrap_err(),
            ConfigurationError::DuplicateStepId(_)
        ));
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let pipeline = Pipeline::new("p", vec![]);
        assert!(matches!(
            Dag::build(pipeline).unwrap_err(),
            ConfigurationError::EmptyPipeline
        ));
    }

    #[test]
    fn transitive_dependents_follow_cascade_chain() {
        let pipeline = Pipeline::new("p", vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])]);
        let dag = Dag::build(pipeline).unwrap();
        let dependents = dag.transitive_dependents_of("a");
        assert!(dependents.contains("b"));
        assert!(dependents.contains("c"));
    }
}

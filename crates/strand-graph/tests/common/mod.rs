//! In-memory graph standing in for Neo4j.
//!
//! Understands the statements the mapper emits: compiled query sets
//! (label scans, relationship chains, named paths and OPTIONAL MATCH lines,
//! WHERE trees evaluated offline, count/node/edge/path projections,
//! SKIP/LIMIT) plus the node and relationship write statements. Anything
//! else is rejected.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use strand_core::{
    Cardinality, Direction, ModelDescriptor, NodeInstance, PropertyDef, PropertyKind, RawNode,
    RawPath, RawRelationship, RawValue, Registry, ScalarValue,
};
use strand_graph::compile::{CompiledQuery, Condition, Fixture};
use strand_graph::{GraphError, Ogm, QueryExecutor};

#[derive(Default)]
struct State {
    nodes: BTreeMap<i64, RawNode>,
    rels: BTreeMap<i64, RawRelationship>,
    next_id: i64,
    log: Vec<String>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn merge_edge(&mut self, rel_type: &str, start: i64, end: i64) -> i64 {
        let existing = self
            .rels
            .values()
            .find(|r| r.rel_type == rel_type && r.start == start && r.end == end)
            .map(|r| r.id);
        match existing {
            Some(id) => id,
            None => {
                let id = self.next_id();
                self.rels
                    .insert(id, RawRelationship::new(id, rel_type, start, end));
                id
            }
        }
    }

    /// Edges of `rel_type` leaving `from` in `direction`, with the node at
    /// the other end.
    fn adjacent(&self, from: i64, rel_type: &str, direction: Direction) -> Vec<(i64, i64)> {
        self.rels
            .values()
            .filter(|r| r.rel_type == rel_type)
            .filter_map(|r| match direction {
                Direction::Outgoing if r.start == from => Some((r.id, r.end)),
                Direction::Incoming if r.end == from => Some((r.id, r.start)),
                Direction::Either if r.start == from => Some((r.id, r.end)),
                Direction::Either if r.end == from => Some((r.id, r.start)),
                _ => None,
            })
            .collect()
    }

    fn has_label(&self, id: i64, label: Option<&str>) -> bool {
        match (self.nodes.get(&id), label) {
            (Some(_), None) => true,
            (Some(node), Some(label)) => node.labels.iter().any(|l| l == label),
            (None, _) => false,
        }
    }
}

/// Shared in-memory graph; clone the `Arc` into an [`strand_graph::Ogm`].
#[derive(Default)]
pub struct FakeGraph {
    state: Mutex<State>,
}

impl FakeGraph {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert an edge directly, bypassing every check.
    pub fn add_edge(&self, rel_type: &str, start: i64, end: i64) -> i64 {
        let mut state = self.state.lock();
        let id = state.next_id();
        state
            .rels
            .insert(id, RawRelationship::new(id, rel_type, start, end));
        id
    }

    pub fn edges(&self, rel_type: &str) -> Vec<RawRelationship> {
        self.state
            .lock()
            .rels
            .values()
            .filter(|r| r.rel_type == rel_type)
            .cloned()
            .collect()
    }

    pub fn node(&self, id: i64) -> Option<RawNode> {
        self.state.lock().nodes.get(&id).cloned()
    }

    /// Every statement text executed so far.
    pub fn queries(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }
}

// ── Pattern parsing ──────────────────────────────────────────────

#[derive(Debug, Clone)]
struct NodePat {
    ident: String,
    label: Option<String>,
}

#[derive(Debug, Clone)]
enum Pattern {
    Node(NodePat),
    Rel {
        lhs: NodePat,
        ident: String,
        rel_type: String,
        direction: Direction,
        rhs: NodePat,
    },
}

fn unquote(name: &str) -> String {
    name.trim_matches('`').replace("``", "`")
}

fn node_pat(inner: &str) -> NodePat {
    match inner.split_once(':') {
        Some((ident, label)) => NodePat {
            ident: ident.to_string(),
            label: Some(unquote(label)),
        },
        None => NodePat {
            ident: inner.to_string(),
            label: None,
        },
    }
}

/// `(a:L)-[r:`T`]->(b)<-[s:`U`]-(c)` as its first node followed by one
/// pattern per hop.
fn parse_chain(p: &str) -> Vec<Pattern> {
    let mut rest = p.trim();
    let close = rest.find(')').unwrap();
    let mut lhs = node_pat(&rest[1..close]);
    rest = &rest[close + 1..];
    let mut patterns = vec![Pattern::Node(lhs.clone())];
    while !rest.is_empty() {
        let open = rest.find('[').unwrap();
        let shut = rest.find(']').unwrap();
        let (ident, typed) = rest[open + 1..shut].split_once(':').unwrap();
        let after = &rest[shut + 1..];
        let direction = if rest.starts_with("<-") {
            Direction::Incoming
        } else if after.starts_with("->") {
            Direction::Outgoing
        } else {
            Direction::Either
        };
        let rhs_open = after.find('(').unwrap();
        let rhs_close = after.find(')').unwrap();
        let rhs = node_pat(&after[rhs_open + 1..rhs_close]);
        patterns.push(Pattern::Rel {
            lhs,
            ident: ident.to_string(),
            rel_type: unquote(typed),
            direction,
            rhs: rhs.clone(),
        });
        lhs = rhs;
        rest = &after[rhs_close + 1..];
    }
    patterns
}

fn match_body(line: &str) -> &str {
    line.trim_start_matches("OPTIONAL MATCH ")
        .trim_start_matches("MATCH ")
}

/// Variable of a named path, `MATCH path = (...)`.
fn path_name(line: &str) -> Option<String> {
    let (name, _) = match_body(line).split_once(" = ")?;
    (!name.contains('(')).then(|| name.to_string())
}

fn parse_match(line: &str) -> Vec<Pattern> {
    let body = match_body(line);
    let body = match body.split_once(" = ") {
        Some((name, chain)) if !name.contains('(') => chain,
        _ => body,
    };
    body.split(", ").flat_map(parse_chain).collect()
}

fn first_rel(line: &str) -> Pattern {
    parse_match(line)
        .into_iter()
        .find(|p| matches!(p, Pattern::Rel { .. }))
        .unwrap_or_else(|| panic!("no relationship pattern in: {line}"))
}

fn int_param(query: &CompiledQuery, key: &str) -> i64 {
    query.params.get(key).and_then(ScalarValue::as_i64).unwrap()
}

fn props_param(query: &CompiledQuery) -> BTreeMap<String, ScalarValue> {
    match query.params.get("props") {
        Some(ScalarValue::Map(map)) => map.clone(),
        _ => BTreeMap::new(),
    }
}

fn apply_props(target: &mut BTreeMap<String, ScalarValue>, props: BTreeMap<String, ScalarValue>) {
    for (k, v) in props {
        if v.is_null() {
            target.remove(&k);
        } else {
            target.insert(k, v);
        }
    }
}

// ── Execution ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct Binding {
    nodes: BTreeMap<String, i64>,
    rels: BTreeMap<String, i64>,
}

impl FakeGraph {
    fn run(&self, query: &CompiledQuery) -> Result<Vec<Vec<RawValue>>, GraphError> {
        let mut state = self.state.lock();
        state.log.push(query.text.clone());
        let text = query.text.as_str();
        let lines: Vec<&str> = text.lines().collect();

        if let Some(rest) = text.strip_prefix("CREATE (n:") {
            let labels = rest.split(" $props").next().unwrap_or_default();
            let id = state.next_id();
            let mut node = RawNode::new(id).with_labels(labels.split(':').map(unquote));
            apply_props(&mut node.properties, props_param(query));
            state.nodes.insert(id, node.clone());
            return Ok(vec![vec![RawValue::Node(node)]]);
        }

        if text.starts_with("MATCH (n) WHERE id(n) = $id") {
            let id = int_param(query, "id");
            if text.contains("DETACH DELETE") {
                state.nodes.remove(&id);
                state.rels.retain(|_, r| r.start != id && r.end != id);
                return Ok(Vec::new());
            }
            let props = props_param(query);
            return Ok(match state.nodes.get_mut(&id) {
                Some(node) => {
                    apply_props(&mut node.properties, props);
                    vec![vec![RawValue::Node(node.clone())]]
                }
                None => Vec::new(),
            });
        }

        if text.starts_with("MATCH (source), (target)") {
            let source = int_param(query, "source_id");
            let target = int_param(query, "target_id");
            if !state.nodes.contains_key(&source) || !state.nodes.contains_key(&target) {
                return Ok(Vec::new());
            }
            if let Some(line) = lines.iter().find(|l| l.starts_with("OPTIONAL MATCH")) {
                if let Pattern::Rel {
                    rel_type,
                    direction,
                    rhs,
                    ..
                } = first_rel(line)
                {
                    state.drop_edges(source, &rel_type, direction, rhs.label.as_deref());
                }
            }
            let merge = lines.iter().find(|l| l.starts_with("MERGE ")).unwrap();
            let Pattern::Rel {
                rel_type, direction, ..
            } = first_rel(merge)
            else {
                unreachable!()
            };
            let (start, end) = match direction {
                Direction::Incoming => (target, source),
                _ => (source, target),
            };
            let id = state.merge_edge(&rel_type, start, end);
            let rel = state.rels.get_mut(&id).unwrap();
            apply_props(&mut rel.properties, props_param(query));
            return Ok(vec![vec![RawValue::Relationship(rel.clone())]]);
        }

        if text.contains("old_rel") && text.contains("new_target") {
            let source = int_param(query, "source_id");
            let old = int_param(query, "old_id");
            let new = int_param(query, "new_id");
            let Pattern::Rel {
                rel_type, direction, ..
            } = first_rel(lines[0])
            else {
                unreachable!()
            };
            if !state.nodes.contains_key(&new) {
                return Ok(Vec::new());
            }
            let Some((old_rel, _)) = state
                .adjacent(source, &rel_type, direction)
                .into_iter()
                .find(|(_, other)| *other == old)
            else {
                return Ok(Vec::new());
            };
            let copied = state.rels[&old_rel].properties.clone();
            match lines.iter().find(|l| l.starts_with("OPTIONAL MATCH")) {
                Some(line) => {
                    let Pattern::Rel { rhs, .. } = first_rel(line) else {
                        unreachable!()
                    };
                    state.drop_edges(source, &rel_type, direction, rhs.label.as_deref());
                }
                None => {
                    state.rels.remove(&old_rel);
                }
            }
            let (start, end) = match direction {
                Direction::Incoming => (new, source),
                _ => (source, new),
            };
            let id = state.merge_edge(&rel_type, start, end);
            let rel = state.rels.get_mut(&id).unwrap();
            apply_props(&mut rel.properties, copied);
            return Ok(vec![vec![RawValue::Relationship(rel.clone())]]);
        }

        if text.ends_with("DELETE r") {
            let source = int_param(query, "source_id");
            let target = query.params.get("target_id").and_then(ScalarValue::as_i64);
            let Pattern::Rel {
                rel_type,
                direction,
                rhs,
                ..
            } = first_rel(lines[0])
            else {
                unreachable!()
            };
            let doomed: Vec<i64> = state
                .adjacent(source, &rel_type, direction)
                .into_iter()
                .filter(|(_, other)| match target {
                    Some(t) => *other == t,
                    None => state.has_label(*other, rhs.label.as_deref()),
                })
                .map(|(rel, _)| rel)
                .collect();
            for id in doomed {
                state.rels.remove(&id);
            }
            return Ok(Vec::new());
        }

        if text.starts_with("MATCH ") {
            return Ok(select(&state, query, &lines));
        }

        Err(GraphError::Conversion(format!("unsupported statement: {text}")))
    }
}

impl State {
    /// Remove every edge of `rel_type` from `source` to nodes with `label`.
    fn drop_edges(&mut self, source: i64, rel_type: &str, direction: Direction, label: Option<&str>) {
        let doomed: Vec<i64> = self
            .adjacent(source, rel_type, direction)
            .into_iter()
            .filter(|(_, other)| self.has_label(*other, label))
            .map(|(rel, _)| rel)
            .collect();
        for id in doomed {
            self.rels.remove(&id);
        }
    }

    /// Every way `binding` extends through `pattern`. A hop from an unbound
    /// (null) variable matches nothing.
    fn extend(&self, binding: &Binding, pattern: &Pattern) -> Vec<Binding> {
        match pattern {
            Pattern::Node(n) => match binding.nodes.get(&n.ident) {
                Some(id) if self.has_label(*id, n.label.as_deref()) => vec![binding.clone()],
                Some(_) => Vec::new(),
                None => self
                    .nodes
                    .keys()
                    .filter(|id| self.has_label(**id, n.label.as_deref()))
                    .map(|id| {
                        let mut nb = binding.clone();
                        nb.nodes.insert(n.ident.clone(), *id);
                        nb
                    })
                    .collect(),
            },
            Pattern::Rel {
                lhs,
                ident,
                rel_type,
                direction,
                rhs,
            } => {
                let Some(from) = binding.nodes.get(&lhs.ident) else {
                    return Vec::new();
                };
                self.adjacent(*from, rel_type, *direction)
                    .into_iter()
                    .filter(|(_, other)| self.has_label(*other, rhs.label.as_deref()))
                    .map(|(rel, other)| {
                        let mut nb = binding.clone();
                        nb.nodes.insert(rhs.ident.clone(), other);
                        nb.rels.insert(ident.clone(), rel);
                        nb
                    })
                    .collect()
            }
        }
    }

    /// Properties, ids and `EXISTS` outcomes of one binding.
    fn fixture(&self, binding: &Binding, conditions: &[&Condition]) -> Fixture {
        let mut fixture = Fixture::new();
        for (ident, id) in &binding.nodes {
            fixture = fixture
                .bind(ident.clone(), self.nodes[id].properties.clone())
                .with_id(ident.clone(), *id);
        }
        for (ident, id) in &binding.rels {
            fixture = fixture
                .bind(ident.clone(), self.rels[id].properties.clone())
                .with_id(ident.clone(), *id);
        }
        let mut patterns = Vec::new();
        for c in conditions {
            exists_patterns(c, &mut patterns);
        }
        for pattern in patterns {
            if let Some(Pattern::Rel {
                lhs,
                rel_type,
                direction,
                rhs,
                ..
            }) = parse_chain(&pattern).pop()
            {
                if let Some(from) = binding.nodes.get(&lhs.ident) {
                    let found = self
                        .adjacent(*from, &rel_type, direction)
                        .into_iter()
                        .any(|(_, other)| self.has_label(other, rhs.label.as_deref()));
                    fixture = fixture.with_pattern(pattern, found);
                }
            }
        }
        fixture
    }
}

fn exists_patterns(condition: &Condition, out: &mut Vec<String>) {
    match condition {
        Condition::Exists { pattern, .. } => out.push(pattern.clone()),
        Condition::All(children) | Condition::Any(children) => {
            for c in children {
                exists_patterns(c, out);
            }
        }
        Condition::Not(inner) => exists_patterns(inner, out),
        _ => {}
    }
}

fn holds(condition: Option<&Condition>, fixture: &Fixture, query: &CompiledQuery) -> bool {
    match condition {
        Some(c) => c.eval(fixture, &query.params) == Some(true),
        None => true,
    }
}

fn select(state: &State, query: &CompiledQuery, lines: &[&str]) -> Vec<Vec<RawValue>> {
    let path = path_name(lines[0]);
    let chain = parse_match(lines[0]);
    let mut bindings = vec![Binding::default()];
    for pattern in &chain {
        bindings = bindings.iter().flat_map(|b| state.extend(b, pattern)).collect();
    }

    let main: Vec<&Condition> = query.condition.iter().collect();
    let mut matching: Vec<Binding> = bindings
        .into_iter()
        .filter(|b| holds(query.condition.as_ref(), &state.fixture(b, &main), query))
        .collect();

    let optional_lines = lines.iter().filter(|l| l.starts_with("OPTIONAL MATCH "));
    for (n, line) in optional_lines.enumerate() {
        let condition = query.optional_conditions.get(n).and_then(Option::as_ref);
        let patterns = parse_match(line);
        matching = matching
            .into_iter()
            .flat_map(|b| {
                let mut found = vec![b.clone()];
                for pattern in &patterns {
                    found = found.iter().flat_map(|f| state.extend(f, pattern)).collect();
                }
                let conditions: Vec<&Condition> = condition.into_iter().collect();
                found.retain(|f| holds(condition, &state.fixture(f, &conditions), query));
                if found.is_empty() {
                    vec![b]
                } else {
                    found
                }
            })
            .collect();
    }

    let ret = lines
        .iter()
        .find_map(|l| l.strip_prefix("RETURN "))
        .unwrap_or_default();
    if let Some(counted) = ret.strip_prefix("count(") {
        let ident = counted.split(')').next().unwrap_or_default();
        let n = matching
            .iter()
            .filter(|b| b.nodes.contains_key(ident) || b.rels.contains_key(ident))
            .count();
        return vec![vec![RawValue::from(ScalarValue::Int(n as i64))]];
    }

    let skip = query.params.get("skip_1").and_then(ScalarValue::as_i64).unwrap_or(0) as usize;
    let limit = query
        .params
        .get("limit_1")
        .and_then(ScalarValue::as_i64)
        .map_or(usize::MAX, |n| n as usize);
    let columns = query.result_columns();
    matching
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|b| {
            columns
                .iter()
                .map(|col| {
                    if path.as_deref() == Some(col.as_str()) {
                        return RawValue::Path(path_value(state, &b, &chain));
                    }
                    match (b.nodes.get(col), b.rels.get(col)) {
                        (Some(id), _) => RawValue::Node(state.nodes[id].clone()),
                        (_, Some(id)) => RawValue::Relationship(state.rels[id].clone()),
                        _ => RawValue::null(),
                    }
                })
                .collect()
        })
        .collect()
}

fn path_value(state: &State, binding: &Binding, chain: &[Pattern]) -> RawPath {
    let mut path = RawPath::default();
    for pattern in chain {
        match pattern {
            Pattern::Node(n) => path.nodes.push(state.nodes[&binding.nodes[&n.ident]].clone()),
            Pattern::Rel { ident, rhs, .. } => {
                path.relationships.push(state.rels[&binding.rels[ident]].clone());
                path.nodes.push(state.nodes[&binding.nodes[&rhs.ident]].clone());
            }
        }
    }
    path
}

#[async_trait]
impl QueryExecutor for FakeGraph {
    async fn execute(&self, query: &CompiledQuery) -> Result<Vec<Vec<RawValue>>, GraphError> {
        self.run(query)
    }
}

// ── Test schema ──────────────────────────────────────────────────

/// People living in one city, owning one or more pets, with at most one
/// employer; companies have at most one CEO.
pub fn schema() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    let person = ModelDescriptor::node("Person")
        .property(PropertyDef::new("uid", PropertyKind::UniqueId))
        .property(PropertyDef::new("name", PropertyKind::String).required())
        .property(PropertyDef::new("age", PropertyKind::Integer))
        .relationship_to("city", "City", "LIVES_IN", Direction::Outgoing, Cardinality::One)
        .relationship_to("pets", "Pet", "OWNS", Direction::Outgoing, Cardinality::OneOrMore)
        .relationship_to("employer", "Company", "WORKS_AT", Direction::Outgoing, Cardinality::ZeroOrOne)
        .relationship_to("leads", "Company", "LEADS", Direction::Outgoing, Cardinality::ZeroOrMore)
        .relationship_to("friends", "Person", "FRIENDS_WITH", Direction::Either, Cardinality::ZeroOrMore)
        .via("Friendship")
        .build();
    let city = ModelDescriptor::node("City")
        .property(PropertyDef::new("name", PropertyKind::String))
        .build();
    let pet = ModelDescriptor::node("Pet")
        .property(PropertyDef::new("name", PropertyKind::String))
        .build();
    let company = ModelDescriptor::node("Company")
        .property(PropertyDef::new("name", PropertyKind::String))
        .relationship_to("ceo", "Person", "LEADS", Direction::Incoming, Cardinality::ZeroOrOne)
        .relationship_to("staff", "Person", "WORKS_AT", Direction::Incoming, Cardinality::ZeroOrMore)
        .build();
    let friendship = ModelDescriptor::relationship("Friendship", "FRIENDS_WITH")
        .property(PropertyDef::new("since", PropertyKind::Integer))
        .build();
    for d in [&person, &city, &pet, &company, &friendship] {
        registry.register_model(d).unwrap();
    }
    registry
}

pub fn ogm(graph: &Arc<FakeGraph>) -> Ogm {
    Ogm::new(graph.clone(), schema())
}

/// Create and save a node with a `name`.
pub async fn make(ogm: &Ogm, model: &str, name: &str) -> NodeInstance {
    let model = ogm.registry().model(model, None).unwrap();
    ogm.create(&NodeInstance::new(model).with("name", name))
        .await
        .unwrap()
}

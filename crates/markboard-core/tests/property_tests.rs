use kurbo::Point;
use markboard_core::{
    Document, HistoryEngine, ParticipantId, Reconciler, RemoteMutation, Shape, ShapeId, Stroke,
    Whiteboard, DEFAULT_HISTORY_CAPACITY,
};
use proptest::prelude::*;
use std::collections::HashSet;

const IDS: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Debug, Clone)]
enum LocalOp {
    Put(usize, f64),
    Delete(usize),
}

impl LocalOp {
    fn apply(&self, wb: &mut Whiteboard) {
        match self {
            LocalOp::Put(i, x) => {
                let shape = Stroke::from_points(IDS[*i], vec![Point::new(*x, 0.0), Point::new(*x, 1.0)]);
                wb.put(shape.into());
            }
            LocalOp::Delete(i) => {
                wb.soft_delete(&ShapeId::from(IDS[*i]));
            }
        }
    }
}

fn local_op() -> impl Strategy<Value = LocalOp> {
    prop_oneof![
        (0..IDS.len(), -100.0..100.0f64).prop_map(|(i, x)| LocalOp::Put(i, x)),
        (0..IDS.len()).prop_map(LocalOp::Delete),
    ]
}

fn batches() -> impl Strategy<Value = Vec<Vec<LocalOp>>> {
    prop::collection::vec(prop::collection::vec(local_op(), 0..6), 1..5)
}

#[derive(Debug, Clone)]
struct RemoteEdit {
    id: usize,
    counter: u64,
    participant: usize,
    x: f64,
    delete: bool,
}

impl RemoteEdit {
    fn to_mutation(&self) -> RemoteMutation {
        let mut shape: Shape = Stroke::from_points(IDS[self.id], vec![Point::new(self.x, 0.0)]).into();
        // Senders assign z-order; the receiver never does for known payloads
        shape.meta_mut().z_order = self.id as u64 + 1;
        let participant = ParticipantId::new(format!("p{}", self.participant));
        if self.delete {
            RemoteMutation::delete(shape, self.counter, participant)
        } else {
            RemoteMutation::put(shape, self.counter, participant)
        }
    }
}

fn remote_edits() -> impl Strategy<Value = Vec<RemoteEdit>> {
    prop::collection::vec(
        (0..IDS.len(), 1..50u64, 0..3usize, -10.0..10.0f64, any::<bool>()).prop_map(
            |(id, counter, participant, x, delete)| RemoteEdit {
                id,
                counter,
                participant,
                x,
                delete,
            },
        ),
        1..12,
    )
    .prop_map(|edits| {
        // One payload per (id, counter, participant): equal versions must carry equal states
        let mut seen = HashSet::new();
        edits
            .into_iter()
            .filter(|e| seen.insert((e.id, e.counter, e.participant)))
            .collect()
    })
}

/// Something one of three collaborating replicas does.
#[derive(Debug, Clone)]
enum ReplicaAction {
    Gesture(usize, Vec<LocalOp>),
    Undo(usize),
    Redo(usize),
    /// Deliver one pending mutation (picked by index) to a replica.
    Deliver(usize, usize),
}

const REPLICAS: usize = 3;

fn replica_action() -> impl Strategy<Value = ReplicaAction> {
    prop_oneof![
        3 => (0..REPLICAS, prop::collection::vec(local_op(), 1..4))
            .prop_map(|(r, ops)| ReplicaAction::Gesture(r, ops)),
        2 => (0..REPLICAS).prop_map(ReplicaAction::Undo),
        1 => (0..REPLICAS).prop_map(ReplicaAction::Redo),
        4 => (0..REPLICAS, any::<usize>()).prop_map(|(r, i)| ReplicaAction::Deliver(r, i)),
    ]
}

/// Three boards with a per-recipient inbox of undelivered mutations.
struct Network {
    boards: Vec<Whiteboard>,
    inboxes: Vec<Vec<RemoteMutation>>,
}

impl Network {
    fn new() -> Self {
        Self {
            boards: ["alice", "bob", "carol"]
                .iter()
                .map(|name| Whiteboard::new(ParticipantId::from(*name)))
                .collect(),
            inboxes: vec![Vec::new(); REPLICAS],
        }
    }

    fn route(&mut self, from: usize) {
        for event in self.boards[from].take_outgoing() {
            for (to, inbox) in self.inboxes.iter_mut().enumerate() {
                if to != from {
                    inbox.push(event.clone());
                }
            }
        }
    }

    fn run(&mut self, action: &ReplicaAction) {
        match action {
            ReplicaAction::Gesture(r, ops) => {
                let wb = &mut self.boards[*r];
                wb.begin_batch("gesture");
                ops.iter().for_each(|op| op.apply(wb));
                wb.commit_batch();
                self.route(*r);
            }
            ReplicaAction::Undo(r) => {
                self.boards[*r].undo();
                self.route(*r);
            }
            ReplicaAction::Redo(r) => {
                self.boards[*r].redo();
                self.route(*r);
            }
            ReplicaAction::Deliver(r, i) => {
                let inbox = &mut self.inboxes[*r];
                if !inbox.is_empty() {
                    let event = inbox.remove(i % inbox.len());
                    self.boards[*r].apply_remote_mutation(event);
                }
            }
        }
    }

    fn flush(&mut self) {
        for r in 0..REPLICAS {
            for event in std::mem::take(&mut self.inboxes[r]) {
                self.boards[r].apply_remote_mutation(event);
            }
        }
    }
}

fn replay(edits: impl Iterator<Item = RemoteMutation>) -> Document {
    let mut doc = Document::with_participant(ParticipantId::from("local"));
    let history = HistoryEngine::new(DEFAULT_HISTORY_CAPACITY, ParticipantId::from("local"));
    let mut reconciler = Reconciler::new();
    for event in edits {
        reconciler.enqueue(event);
    }
    reconciler.drain(&mut doc, &history);
    doc
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_undo_redo_round_trip(setup in batches(), last in prop::collection::vec(local_op(), 0..8)) {
        let mut wb = Whiteboard::new(ParticipantId::from("alice"));
        for ops in &setup {
            wb.begin_batch("setup");
            ops.iter().for_each(|op| op.apply(&mut wb));
            wb.commit_batch();
        }

        let before = wb.document().snapshot();
        wb.begin_batch("last");
        last.iter().for_each(|op| op.apply(&mut wb));
        wb.commit_batch();
        let after = wb.document().snapshot();

        prop_assert!(wb.undo());
        prop_assert_eq!(wb.document().shapes(), &before);
        prop_assert!(wb.redo());
        prop_assert_eq!(wb.document().shapes(), &after);
    }

    #[test]
    fn prop_conflict_resolution_is_order_independent(edits in remote_edits()) {
        let forward = replay(edits.iter().map(RemoteEdit::to_mutation));
        let backward = replay(edits.iter().rev().map(RemoteEdit::to_mutation));
        prop_assert_eq!(forward.shapes(), backward.shapes());

        for shape in forward.shapes().values() {
            let winner = edits
                .iter()
                .filter(|e| IDS[e.id] == shape.id().as_str())
                .map(|e| (e.counter, e.participant))
                .max();
            let stored = (shape.updated_at(), shape.updated_by().as_str().trim_start_matches('p').parse::<usize>().ok());
            prop_assert_eq!(winner.map(|(c, p)| (c, Some(p))), Some(stored));
        }
    }

    #[test]
    fn prop_replicas_converge_with_undo_and_redo(actions in prop::collection::vec(replica_action(), 1..40)) {
        let mut net = Network::new();
        for action in &actions {
            net.run(action);
        }
        net.flush();

        let first = net.boards[0].document();
        for other in &net.boards[1..] {
            let doc = other.document();
            prop_assert_eq!(doc.shapes(), first.shapes());
            for id in IDS.iter().map(|s| ShapeId::from(*s)) {
                prop_assert_eq!(doc.version(&id), first.version(&id));
            }
        }
    }

    #[test]
    fn prop_redo_cleared_by_new_commit(ops in prop::collection::vec(local_op(), 1..6)) {
        let mut wb = Whiteboard::new(ParticipantId::from("alice"));
        wb.begin_batch("first");
        ops.iter().for_each(|op| op.apply(&mut wb));
        wb.commit_batch();
        wb.undo();

        wb.begin_batch("second");
        ops.iter().for_each(|op| op.apply(&mut wb));
        wb.commit_batch();

        prop_assert!(!wb.can_redo());
        prop_assert!(!wb.redo());
    }
}

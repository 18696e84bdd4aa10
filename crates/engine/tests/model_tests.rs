// End-to-end behaviour of the model through its public API.

use tabula_engine::commands::Command;
use tabula_engine::services::SequentialUidGenerator;
use tabula_engine::{
    CancelledReason, Dimension, EngineSettings, ErrorKind, Model, Services, SheetId, Value, Zone,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn model() -> (Model, SheetId) {
    let model = Model::with_settings(
        EngineSettings::default(),
        Services::new(Box::new(SequentialUidGenerator::new("id"))),
    );
    let sheet = model.get_sheet_ids()[0].clone();
    (model, sheet)
}

fn set(model: &mut Model, sheet: &SheetId, xc: &str, text: &str) {
    let (col, row) = tabula_engine::zone::to_cartesian(xc).unwrap();
    let result = model.dispatch(Command::update_content(sheet.clone(), row, col, text));
    assert!(result.is_successful, "{} = {} refused: {:?}", xc, text, result.reasons);
}

fn value(model: &Model, sheet: &SheetId, xc: &str) -> Value {
    model.get_evaluated_cell_at(sheet, xc).unwrap().value
}

fn error_kind(model: &Model, sheet: &SheetId, xc: &str) -> Option<ErrorKind> {
    value(model, sheet, xc).as_error().map(|e| e.kind)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[test]
fn operator_precedence() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "=2+3*4");
    assert_eq!(value(&m, &s, "A1"), Value::Number(14.0));
}

#[test]
fn sum_of_range() {
    let (mut m, s) = model();
    set(&mut m, &s, "C4", "1");
    set(&mut m, &s, "C5", "2");
    set(&mut m, &s, "A1", "=SUM(C4:C5)");
    assert_eq!(value(&m, &s, "A1"), Value::Number(3.0));
}

#[test]
fn text_compares_greater_than_number() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", r#"="4" > 1 & 2"#);
    assert_eq!(value(&m, &s, "A1"), Value::Boolean(true));
}

#[test]
fn changes_propagate_through_chains() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "1");
    set(&mut m, &s, "B1", "=A1*2");
    set(&mut m, &s, "C1", "=B1+A1");
    assert_eq!(value(&m, &s, "C1"), Value::Number(3.0));

    set(&mut m, &s, "A1", "10");
    assert_eq!(value(&m, &s, "B1"), Value::Number(20.0));
    assert_eq!(value(&m, &s, "C1"), Value::Number(30.0));
}

#[test]
fn cycles_are_values_not_failures() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "=B1+1");
    set(&mut m, &s, "B1", "=A1+1");
    set(&mut m, &s, "C1", "=A1");
    assert_eq!(error_kind(&m, &s, "A1"), Some(ErrorKind::Cycle));
    assert_eq!(error_kind(&m, &s, "B1"), Some(ErrorKind::Cycle));
    assert!(value(&m, &s, "C1").is_error());

    // Breaking the loop heals every member
    set(&mut m, &s, "B1", "5");
    assert_eq!(value(&m, &s, "A1"), Value::Number(6.0));
    assert_eq!(value(&m, &s, "C1"), Value::Number(6.0));
}

#[test]
fn unknown_function_is_name_error() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "=NOPE(1)");
    assert_eq!(error_kind(&m, &s, "A1"), Some(ErrorKind::Name));
    set(&mut m, &s, "A2", "=1+");
    assert_eq!(error_kind(&m, &s, "A2"), Some(ErrorKind::BadExpression));
}

#[test]
fn arrays_spread_and_block() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "=SEQUENCE(3)");
    set(&mut m, &s, "B1", "=SUM(A1:A3)");
    assert_eq!(value(&m, &s, "A3"), Value::Number(3.0));
    assert_eq!(value(&m, &s, "B1"), Value::Number(6.0));

    set(&mut m, &s, "A2", "x");
    assert_eq!(error_kind(&m, &s, "A1"), Some(ErrorKind::Spread));

    m.dispatch(Command::RequestUndo);
    assert_eq!(value(&m, &s, "A2"), Value::Number(2.0));
    assert_eq!(value(&m, &s, "B1"), Value::Number(6.0));
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[test]
fn undo_reevaluates_dependents() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "1");
    set(&mut m, &s, "B1", "=A1+1");
    set(&mut m, &s, "A1", "42");
    assert_eq!(value(&m, &s, "B1"), Value::Number(43.0));

    assert!(m.dispatch(Command::RequestUndo).is_successful);
    assert_eq!(value(&m, &s, "A1"), Value::Number(1.0));
    assert_eq!(value(&m, &s, "B1"), Value::Number(2.0));

    assert!(m.dispatch(Command::RequestRedo).is_successful);
    assert_eq!(value(&m, &s, "B1"), Value::Number(43.0));
}

#[test]
fn new_change_clears_redo() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "1");
    m.dispatch(Command::RequestUndo);
    assert!(m.can_redo());
    set(&mut m, &s, "A2", "2");
    assert!(!m.can_redo());
    assert!(m
        .dispatch(Command::RequestRedo)
        .is_cancelled_because(CancelledReason::EmptyRedoStack));
}

#[test]
fn refused_command_changes_nothing() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "1");
    let before = m.export_json().unwrap();
    let result = m.dispatch(Command::RemoveColumnsRows {
        sheet_id: s.clone(),
        dimension: Dimension::Row,
        elements: (0..100).collect(),
    });
    assert!(result.is_cancelled_because(CancelledReason::NotEnoughElements));
    assert_eq!(m.export_json().unwrap(), before);
}

#[test]
fn remove_duplicates_rewrites_dependents() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "x");
    set(&mut m, &s, "A2", "x");
    set(&mut m, &s, "A3", "y");
    set(&mut m, &s, "C1", "=A3&\"!\"");
    set(&mut m, &s, "C2", "=A3+1");

    let result = m.dispatch(Command::RemoveDuplicates {
        sheet_id: s.clone(),
        target: Zone::new(0, 0, 2, 0),
        columns: vec![0],
        has_header: false,
    });
    assert!(result.is_successful);
    assert_eq!(m.get_cell_content(&s, 1, 2), "=A2+1");
    assert_eq!(value(&m, &s, "A2"), Value::Text("y".into()));
    assert_eq!(value(&m, &s, "A3"), Value::Empty);
    assert_eq!(value(&m, &s, "C1"), Value::Text("y!".into()));

    m.dispatch(Command::RequestUndo);
    assert_eq!(m.get_cell_content(&s, 1, 2), "=A3+1");
    assert_eq!(value(&m, &s, "A2"), Value::Text("x".into()));
    assert_eq!(value(&m, &s, "C1"), Value::Text("y!".into()));
}

#[test]
fn structural_undo_round_trip() {
    let (mut m, s) = model();
    set(&mut m, &s, "B2", "5");
    set(&mut m, &s, "D4", "=B2*2");
    let before = m.export_json().unwrap();

    m.dispatch(Command::AddColumnsRows {
        sheet_id: s.clone(),
        dimension: Dimension::Col,
        base: 0,
        quantity: 3,
        position: tabula_engine::InsertPosition::Before,
    });
    assert_eq!(m.get_cell_content(&s, 3, 6), "=E2*2");
    assert_eq!(value(&m, &s, "G4"), Value::Number(10.0));

    m.dispatch(Command::RemoveColumnsRows {
        sheet_id: s.clone(),
        dimension: Dimension::Col,
        elements: vec![4],
    });
    assert!(value(&m, &s, "F4").is_error());

    m.dispatch(Command::RequestUndo);
    m.dispatch(Command::RequestUndo);
    assert_eq!(m.export_json().unwrap(), before);
    assert_eq!(value(&m, &s, "D4"), Value::Number(10.0));
}

#[test]
fn batch_is_one_revision() {
    let (mut m, s) = model();
    let result = m.dispatch_batch(vec![
        Command::update_content(s.clone(), 0, 0, "1"),
        Command::update_content(s.clone(), 0, 1, "=A1+1"),
    ]);
    assert!(result.is_successful);
    assert_eq!(value(&m, &s, "B1"), Value::Number(2.0));

    m.dispatch(Command::RequestUndo);
    assert!(m.get_cell(&s, 0, 0).is_none());
    assert!(m.get_cell(&s, 0, 1).is_none());
    assert!(!m.can_undo());
}

// ---------------------------------------------------------------------------
// Collaboration
// ---------------------------------------------------------------------------

mod collaboration {
    use super::*;
    use std::rc::Rc;
    use tabula_engine::collaboration::LocalTransport;

    fn services(prefix: &str) -> Services {
        Services::new(Box::new(SequentialUidGenerator::new(prefix)))
    }

    /// Two models over the same workbook, joined to one transport.
    fn pair() -> (Model, Model, SheetId, Rc<LocalTransport>) {
        let mut alice = Model::with_settings(EngineSettings::default(), services("a"));
        let sheet = alice.get_sheet_ids()[0].clone();
        let snapshot = alice.export_json().unwrap();
        let mut bob = Model::from_json(&snapshot, EngineSettings::default(), services("b")).unwrap();

        let transport = Rc::new(LocalTransport::manual());
        alice.join_session("alice", transport.clone());
        bob.join_session("bob", transport.clone());
        (alice, bob, sheet, transport)
    }

    #[test]
    fn out_of_order_revisions_apply_in_author_order() {
        let (mut alice, mut bob, s, transport) = pair();
        set(&mut alice, &s, "A1", "1");
        set(&mut alice, &s, "A1", "2");
        set(&mut alice, &s, "B1", "=A1*10");
        assert_eq!(transport.pending_len(), 3);

        // Last revision first: nothing is ready until the gap fills
        assert!(transport.deliver_at(2));
        assert_eq!(bob.receive_remote(), 0);
        assert!(transport.deliver_at(1));
        assert_eq!(bob.receive_remote(), 0);
        assert!(transport.deliver_at(0));
        assert_eq!(bob.receive_remote(), 3);

        assert_eq!(value(&bob, &s, "A1"), Value::Number(2.0));
        assert_eq!(value(&bob, &s, "B1"), Value::Number(20.0));
        assert_eq!(bob.export_json().unwrap(), alice.export_json().unwrap());
        assert!(!bob.can_undo());
    }

    #[test]
    fn undo_is_shared_with_collaborators() {
        let (mut alice, mut bob, s, transport) = pair();
        set(&mut alice, &s, "A1", "5");
        set(&mut alice, &s, "A2", "=A1+1");
        assert!(alice.dispatch(Command::RequestUndo).is_successful);

        transport.deliver_all();
        assert_eq!(bob.receive_remote(), 3);
        assert!(bob.get_cell(&s, 1, 0).is_none());
        assert_eq!(value(&bob, &s, "A1"), Value::Number(5.0));
        assert_eq!(bob.export_json().unwrap(), alice.export_json().unwrap());
    }

    #[test]
    fn edits_flow_both_ways() {
        let (mut alice, mut bob, s, transport) = pair();
        set(&mut alice, &s, "A1", "3");
        set(&mut bob, &s, "B1", "=A1*A1");
        transport.deliver_all();
        assert_eq!(alice.receive_remote(), 1);
        assert_eq!(bob.receive_remote(), 1);
        assert_eq!(value(&alice, &s, "B1"), Value::Number(9.0));
        assert_eq!(value(&bob, &s, "B1"), Value::Number(9.0));
    }

    #[test]
    fn nothing_is_received_after_leaving() {
        let (mut alice, mut bob, s, transport) = pair();
        bob.leave_session();
        set(&mut alice, &s, "A1", "1");
        transport.deliver_all();
        assert_eq!(bob.receive_remote(), 0);
        assert!(bob.get_cell(&s, 0, 0).is_none());
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn export_and_reload_preserves_values() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "2");
    set(&mut m, &s, "A2", "3");
    set(&mut m, &s, "A3", "=SUM(A1:A2)*2");
    set(&mut m, &s, "B1", "=SEQUENCE(2,2)");
    m.dispatch(Command::AddMerge {
        sheet_id: s.clone(),
        target: vec![Zone::new(5, 5, 6, 6)],
        force: false,
    });

    let text = m.export_json().unwrap();
    let reloaded = Model::from_json(
        &text,
        EngineSettings::default(),
        Services::new(Box::new(SequentialUidGenerator::new("r"))),
    )
    .unwrap();

    assert_eq!(value(&reloaded, &s, "A3"), Value::Number(10.0));
    assert_eq!(value(&reloaded, &s, "C2"), Value::Number(4.0));
    assert_eq!(reloaded.get_merges(&s), vec![Zone::new(5, 5, 6, 6)]);
    assert_eq!(reloaded.export_json().unwrap(), text);
    assert!(!reloaded.can_undo());
}

#[test]
fn split_number_does_not_poison_joined_one() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "=1 2");
    set(&mut m, &s, "B1", "=12");
    assert_eq!(error_kind(&m, &s, "A1"), Some(ErrorKind::BadExpression));
    assert_eq!(value(&m, &s, "B1"), Value::Number(12.0));

    set(&mut m, &s, "C1", "= 1 2 ");
    assert_eq!(error_kind(&m, &s, "C1"), Some(ErrorKind::BadExpression));
}

#[test]
fn precise_literal_survives_evaluation() {
    let (mut m, s) = model();
    set(&mut m, &s, "A1", "=0.12345678901234*2");
    assert_eq!(value(&m, &s, "A1"), Value::Number(0.12345678901234 * 2.0));
}

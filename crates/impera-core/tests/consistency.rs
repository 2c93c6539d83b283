//! End-to-end behavior of direct writes, transitions and the reentrancy guard.

use std::cell::RefCell;
use std::rc::Rc;

use impera_core::{
    Engine, ImperaError, MemoryStorage, Message, ObserverId, StateTransition, StateVariable,
    Watchable,
};
use serde_json::{Value, json};

type Log = Rc<RefCell<Vec<String>>>;

fn record(log: &Log, cell: &impl Watchable) {
    let log = Rc::clone(log);
    let name = cell.name().to_owned();
    cell.attach(
        ObserverId::fresh(),
        Rc::new(move |payload: Option<&Value>| {
            let shown = payload.map_or_else(String::new, Value::to_string);
            log.borrow_mut().push(format!("{name}:{shown}"));
        }),
    );
}

#[test]
fn count_example() {
    let storage = MemoryStorage::new();
    let engine = Engine::new(storage.clone());
    let log: Log = Rc::default();

    let count = StateVariable::new(&engine, "count", 7).unwrap();
    assert_eq!(storage.get_raw("count").as_deref(), Some("7"));
    record(&log, &count);
    count.set(9).unwrap();
    assert_eq!(storage.get_raw("count").as_deref(), Some("9"));
    assert_eq!(*log.borrow(), vec!["count:9"]);

    let reloaded = StateVariable::new(&engine, "count", 7).unwrap();
    assert_ne!(reloaded.get(), json!(7));
    assert_eq!(reloaded.get(), json!(9));
}

#[test]
fn transition_example_notifies_after_procedure() {
    let engine = Engine::in_memory();
    let log: Log = Rc::default();
    let var_a = StateVariable::new(&engine, "varA", 0).unwrap();
    let var_b = StateVariable::new(&engine, "varB", "").unwrap();
    record(&log, &var_a);
    record(&log, &var_b);

    let (a, b, l) = (var_a.clone(), var_b.clone(), Rc::clone(&log));
    let t = StateTransition::new(&engine, "example")
        .unwrap()
        .with_procedure(move |_| {
            a.set(1)?;
            l.borrow_mut().push("after a=1".into());
            a.set(2)?;
            b.set("x")?;
            l.borrow_mut().push("procedure end".into());
            Ok(())
        });
    t.apply(None).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["after a=1", "procedure end", "varA:2", "varB:\"x\""]
    );
}

#[test]
fn watcher_setter_during_direct_flush_is_reentrant() {
    let engine = Engine::in_memory();
    let text = StateVariable::new(&engine, "test_string", "ciao").unwrap();
    let number = StateVariable::new(&engine, "test_number", 7).unwrap();
    let n = number.clone();
    text.watch(ObserverId::fresh(), move |_| {
        let _ = n.set(8);
    });

    let err = text.set("hey").unwrap_err();
    assert!(err.to_string().contains("forbidden multiple-update"));
    assert_eq!(number.get(), json!(7));
    assert!(!engine.is_locked());

    // An unrelated assignment succeeds afterwards.
    number.set(10).unwrap();
    assert_eq!(number.get(), json!(10));
}

#[test]
fn watcher_setter_on_locked_variable_is_still_reentrant() {
    let engine = Engine::in_memory();
    let trigger = StateVariable::new(&engine, "trigger", false).unwrap();
    let guarded = StateVariable::new(&engine, "guarded", 0).unwrap();
    guarded.add_transition("bump", |var, _| var.set(1)).unwrap();
    let g = guarded.clone();
    let seen = Rc::new(RefCell::new(None));
    let s = Rc::clone(&seen);
    trigger.watch(ObserverId::fresh(), move |_| {
        *s.borrow_mut() = Some(g.set(5));
    });
    assert!(matches!(
        trigger.set(true),
        Err(ImperaError::ReentrantUpdate { .. })
    ));
    assert!(matches!(
        seen.borrow().as_ref(),
        Some(Err(ImperaError::ReentrantUpdate { .. }))
    ));
}

#[test]
fn remaining_watchers_are_skipped_after_violation() {
    let engine = Engine::in_memory();
    let source = StateVariable::new(&engine, "source", 0).unwrap();
    let other = StateVariable::new(&engine, "other", 0).unwrap();
    let log: Log = Rc::default();
    let o = other.clone();
    source.watch(ObserverId::fresh(), move |_| {
        let _ = o.set(1);
    });
    record(&log, &source);
    assert!(source.set(1).is_err());
    assert!(log.borrow().is_empty());
    // The offending write never landed, the outer value did.
    assert_eq!(other.get(), json!(0));
    assert_eq!(source.get(), json!(1));
}

#[test]
fn messages_pass_through_during_passes() {
    let engine = Engine::in_memory();
    let var = StateVariable::new(&engine, "var", 0).unwrap();
    let channel = Message::new(&engine, "toast").unwrap();
    let log: Log = Rc::default();
    record(&log, &channel);
    let c = channel.clone();
    var.watch(ObserverId::fresh(), move |value| c.send(value.cloned()));
    var.set(3).unwrap();
    assert_eq!(*log.borrow(), vec!["toast:3"]);
}

#[test]
fn structured_getters_and_setters() {
    let storage = MemoryStorage::new();
    let engine = Engine::new(storage.clone());
    let obj = StateVariable::new(
        &engine,
        "test_object",
        json!({"ciao": "bella", "hey": 67, "poz": ["cool", 9]}),
    )
    .unwrap();
    obj.set(json!({"bim": "bum", "bam": 8, "poz": [6, 7]})).unwrap();
    obj.proxy().unwrap().push("/poz", json!(8)).unwrap();
    assert_eq!(obj.get(), json!({"bim": "bum", "bam": 8, "poz": [6, 7, 8]}));
    assert_eq!(
        storage.get_raw("test_object").as_deref(),
        Some(r#"{"bim":"bum","bam":8,"poz":[6,7,8]}"#)
    );
}

#[test]
fn no_op_structured_write_does_not_notify() {
    let engine = Engine::in_memory();
    let obj = StateVariable::new(&engine, "obj", json!({"a": 1})).unwrap();
    let log: Log = Rc::default();
    record(&log, &obj);
    let proxy = obj.proxy().unwrap();
    proxy.set("/a", json!(1)).unwrap();
    assert!(log.borrow().is_empty());
    proxy.set("/a", json!(2)).unwrap();
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn direct_whole_value_write_always_notifies() {
    let engine = Engine::in_memory();
    let count = StateVariable::new(&engine, "count", 1).unwrap();
    let log: Log = Rc::default();
    record(&log, &count);
    count.set(1).unwrap();
    assert_eq!(*log.borrow(), vec!["count:1"]);
}

#[test]
fn failed_transition_keeps_partial_in_memory_edit() {
    let storage = MemoryStorage::new();
    let engine = Engine::new(storage.clone());
    let todo = StateVariable::new(&engine, "todo", json!({"items": []})).unwrap();
    todo.add_transition("add", |var, input| {
        let item = input.cloned().unwrap_or_default();
        var.proxy()?.push("/items", item.clone())?;
        if item.as_str().is_some_and(str::is_empty) {
            return Err(ImperaError::aborted("empty item"));
        }
        Ok(())
    })
    .unwrap();

    let log: Log = Rc::default();
    record(&log, &todo);
    assert!(todo.apply_transition("add", Some(json!(""))).is_err());
    assert!(log.borrow().is_empty());
    assert_eq!(storage.get_raw("todo").as_deref(), Some(r#"{"items":[]}"#));
    assert_eq!(todo.get(), json!({"items": [""]}));

    todo.apply_transition("add", Some(json!("milk"))).unwrap();
    assert_eq!(
        storage.get_raw("todo").as_deref(),
        Some(r#"{"items":["","milk"]}"#)
    );
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn independent_engines_do_not_share_locks() {
    let first = Engine::in_memory();
    let second = Engine::in_memory();
    let a = StateVariable::new(&first, "a", 0).unwrap();
    let b = StateVariable::new(&second, "b", 0).unwrap();
    let bb = b.clone();
    let result = Rc::new(RefCell::new(None));
    let r = Rc::clone(&result);
    a.watch(ObserverId::fresh(), move |_| {
        *r.borrow_mut() = Some(bb.set(1));
    });
    a.set(1).unwrap();
    assert_eq!(*result.borrow(), Some(Ok(())));
    assert_eq!(b.get(), json!(1));
}

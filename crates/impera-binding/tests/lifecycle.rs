//! Component lifecycle across several adapters sharing one engine.

use std::cell::RefCell;
use std::rc::Rc;

use impera_binding::{BindingAdapter, BindingError, Cell, HandlerTable};
use impera_core::{
    Engine, ImperaError, MemoryStorage, Message, ObserverId, StateTransition, StateVariable,
    Watchable,
};
use proptest::prelude::*;
use serde_json::{Value, json};

struct App {
    storage: MemoryStorage,
    todo: StateVariable,
    filter: StateVariable,
    clear: StateTransition,
    toast: Message,
}

fn app() -> App {
    let storage = MemoryStorage::new();
    let engine = Engine::new(storage.clone());
    let todo = StateVariable::new(&engine, "todo", json!([])).unwrap();
    let filter = StateVariable::new(&engine, "filter", "all").unwrap();
    todo.add_transition("add", |var, input| {
        var.proxy()?.push("", input.cloned().unwrap_or_default())?;
        Ok(())
    })
    .unwrap();
    let toast = Message::new(&engine, "toast").unwrap();

    let (t, f, m) = (todo.clone(), filter.clone(), toast.clone());
    let clear = StateTransition::new(&engine, "clear")
        .unwrap()
        .with_procedure(move |_| {
            t.proxy()?.update(|items| *items = json!([]))?;
            f.set("all")?;
            m.send(Some(json!("cleared")));
            Ok(())
        });
    App {
        storage,
        todo,
        filter,
        clear,
        toast,
    }
}

#[test]
fn list_and_footer_stay_consistent() {
    let app = app();
    let list = BindingAdapter::new([Cell::from(&app.todo), Cell::from(&app.filter)]).unwrap();
    let footer = BindingAdapter::new([
        Cell::from(&app.todo),
        Cell::from(&app.clear),
        Cell::from(&app.toast),
    ])
    .unwrap();

    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let (l1, l2, l3, l4) = (
        Rc::clone(&log),
        Rc::clone(&log),
        Rc::clone(&log),
        Rc::clone(&log),
    );
    let mut list_handlers = HandlerTable::new();
    list_handlers.on_update("todo", move |v| {
        l1.borrow_mut().push(format!("list {}", v.map_or(0, |v| v.as_array().map_or(0, Vec::len))));
    });
    let mut footer_handlers = HandlerTable::new();
    footer_handlers
        .on_update("todo", move |_| l2.borrow_mut().push("footer todo".into()))
        .on_transition("clear", move |_| l3.borrow_mut().push("footer clear".into()))
        .on_message("toast", move |p| {
            l4.borrow_mut().push(format!("toast {}", p.cloned().unwrap_or(Value::Null)));
        });

    let (list_id, footer_id) = (ObserverId::fresh(), ObserverId::fresh());
    list.connect(list_id, &list_handlers).unwrap();
    footer.connect(footer_id, &footer_handlers).unwrap();
    assert_eq!(*log.borrow(), vec!["list 0", "footer todo"]);
    log.borrow_mut().clear();

    list.apply_transition("add", Some(json!("milk"))).unwrap();
    list.apply_transition("add", Some(json!("eggs"))).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["list 1", "footer todo", "list 2", "footer todo"]
    );
    assert_eq!(app.storage.get_raw("todo").as_deref(), Some(r#"["milk","eggs"]"#));
    log.borrow_mut().clear();

    footer.apply_transition("clear", None).unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["toast \"cleared\"", "footer clear", "list 0", "footer todo"]
    );
    assert_eq!(app.storage.get_raw("todo").as_deref(), Some("[]"));

    list.disconnect(list_id);
    footer.disconnect(footer_id);
    assert_eq!(app.todo.watcher_count(), 0);
    assert_eq!(app.clear.watcher_count(), 0);
}

#[test]
fn components_cannot_write_variables_directly() {
    let app = app();
    let adapter = BindingAdapter::new([Cell::from(&app.todo)]).unwrap();
    let snapshot = adapter.value("todo").unwrap();
    assert_eq!(snapshot, json!([]));
    assert!(matches!(
        app.todo.set(json!(["sneaky"])),
        Err(ImperaError::AssignmentForbidden { .. })
    ));
    assert_eq!(adapter.value("todo").unwrap(), json!([]));
}

#[test]
fn handler_that_writes_during_flush_fails_the_dispatch() {
    let app = app();
    let adapter = BindingAdapter::new([Cell::from(&app.todo), Cell::from(&app.filter)]).unwrap();
    let filter = app.filter.clone();
    let mut handlers = HandlerTable::new();
    handlers.on_update("todo", move |_| {
        let _ = filter.set("done");
    });
    // The initial render runs outside any pass, so the write succeeds there.
    adapter.connect(ObserverId::fresh(), &handlers).unwrap();
    assert_eq!(app.filter.get(), json!("done"));

    let err = adapter
        .apply_transition("add", Some(json!("milk")))
        .unwrap_err();
    assert!(matches!(
        err,
        BindingError::Core(ImperaError::ReentrantUpdate { .. })
    ));
    assert!(!app.todo.engine().is_locked());
}

#[test]
fn render_variant_covers_listed_transitions() {
    let app = app();
    let adapter = BindingAdapter::new([Cell::from(&app.clear), Cell::from(&app.toast)]).unwrap();
    let renders = Rc::new(RefCell::new(0));
    let r = Rc::clone(&renders);
    adapter
        .connect_with_render(ObserverId::fresh(), &HandlerTable::new(), move || {
            *r.borrow_mut() += 1;
        })
        .unwrap();
    adapter.apply_transition("clear", None).unwrap();
    assert_eq!(*renders.borrow(), 1);
    // Messages never request a render on their own.
    adapter.send_message("toast", None).unwrap();
    assert_eq!(*renders.borrow(), 1);
}

proptest! {
    #[test]
    fn watcher_count_tracks_connected_components(ops in prop::collection::vec((0usize..4, any::<bool>()), 0..40)) {
        let app = app();
        let adapter = BindingAdapter::new([Cell::from(&app.todo)]).unwrap();
        let ids: Vec<ObserverId> = (0..4).map(|_| ObserverId::fresh()).collect();
        let mut connected = [false; 4];
        let mut handlers = HandlerTable::new();
        handlers.on_update("todo", |_| {});

        for (slot, connect) in ops {
            if connect {
                adapter.connect(ids[slot], &handlers).unwrap();
            } else {
                adapter.disconnect(ids[slot]);
            }
            connected[slot] = connect;
            let expected = connected.iter().filter(|c| **c).count();
            prop_assert_eq!(app.todo.watcher_count(), expected);
        }
    }
}

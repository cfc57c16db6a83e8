#![forbid(unsafe_code)]

//! Host lifecycle: render cascade ordering, updates, context, teardown.

use std::cell::RefCell;
use std::rc::Rc;

use weave::prelude::*;

type Journal = Rc<RefCell<Vec<String>>>;

/// Records its hooks. Renders its children as root hosts, or a `<div>` when
/// it has none.
struct Journaled {
    name: &'static str,
    journal: Journal,
    children: Vec<&'static str>,
    hidden: Vec<&'static str>,
}

impl Journaled {
    fn mount(name: &'static str, journal: &Journal) -> Self {
        Self {
            name,
            journal: Rc::clone(journal),
            children: Vec::new(),
            hidden: Vec::new(),
        }
    }

    fn with(mut self, child: &'static str) -> Self {
        self.children.push(child);
        self
    }

    /// Child mounted during render but not returned as a root.
    fn with_hidden(mut self, child: &'static str) -> Self {
        self.hidden.push(child);
        self
    }

    fn log(&self, event: &str) {
        self.journal.borrow_mut().push(format!("{}:{event}", self.name));
    }
}

impl Component for Journaled {
    fn render(&mut self, cx: &mut Cx<'_>) -> Result<Vec<Child>, RuntimeError> {
        self.log("render");
        let mut roots = Vec::new();
        for name in self.children.clone() {
            roots.push(Child::Host(cx.mount(Mount::new(Journaled::mount(name, &self.journal)))?));
        }
        for name in self.hidden.clone() {
            cx.mount(Mount::new(Journaled::mount(name, &self.journal)))?;
        }
        if roots.is_empty() {
            roots.push(Child::Dom(cx.element("div")));
        }
        Ok(roots)
    }

    fn after_render(&mut self, cx: &mut Cx<'_>) {
        assert_eq!(cx.state(), HostState::Initializing);
        self.log("after_render");
    }

    fn before_destroy(&mut self, _cx: &mut Cx<'_>) {
        self.log("before_destroy");
    }
}

fn events(journal: &Journal, suffix: &str) -> Vec<String> {
    journal
        .borrow()
        .iter()
        .filter(|e| e.ends_with(suffix))
        .cloned()
        .collect()
}

#[test]
fn after_render_runs_bottom_up() {
    let journal = Journal::default();
    let mut rt = Runtime::new();
    let body = rt.doc().create_element("body");
    let root = Journaled::mount("root", &journal)
        .with("left")
        .with("right")
        .with_hidden("portal");
    let host = rt.mount_root(Mount::new(root), body).unwrap();

    assert_eq!(
        events(&journal, ":after_render"),
        vec![
            "portal:after_render",
            "left:after_render",
            "right:after_render",
            "root:after_render",
        ]
    );
    assert_eq!(rt.state(host), HostState::Rendered);
    assert_eq!(rt.non_root_hosts(host).len(), 1);
    assert_eq!(rt.doc().inner_html(body), "<div></div><div></div>");
}

#[test]
fn destroy_runs_hooks_top_down_and_is_idempotent() {
    let journal = Journal::default();
    let mut rt = Runtime::new();
    let body = rt.doc().create_element("body");
    let root = Journaled::mount("root", &journal).with("leaf").with_hidden("portal");
    let host = rt.mount_root(Mount::new(root), body).unwrap();
    let graph_nodes = rt.graph().live_nodes();
    assert_eq!(graph_nodes, 3, "one attrs object per host");

    rt.destroy(host, true);
    rt.destroy(host, true);
    assert_eq!(
        events(&journal, ":before_destroy"),
        vec![
            "root:before_destroy",
            "portal:before_destroy",
            "leaf:before_destroy",
        ]
    );
    assert_eq!(rt.live_hosts(), 0);
    assert_eq!(rt.graph().live_nodes(), 0);
    assert_eq!(rt.doc().inner_html(body), "");
}

#[test]
fn render_errors_destroy_the_failed_child() {
    let mut rt = Runtime::new();
    let body = rt.doc().create_element("body");
    let err = rt
        .mount_root(
            Mount::from_fn(|cx: &mut Cx<'_>| {
                let child = cx.mount(Mount::from_fn(|_: &mut Cx<'_>| Ok(Vec::new())))?;
                Ok(vec![Child::Host(child)])
            }),
            body,
        )
        .unwrap_err();
    assert!(matches!(err, RuntimeError::EmptyRender { .. }));
    assert_eq!(rt.live_hosts(), 0);
}

#[test]
fn context_is_inherited_and_frozen() {
    let mut rt = Runtime::new();
    let body = rt.doc().create_element("body");
    let seen: Rc<RefCell<Option<Rc<String>>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let host = rt
        .mount_root(
            Mount::from_fn(move |cx: &mut Cx<'_>| {
                cx.set_context("locale", String::from("fr"), false)?;
                let sink = Rc::clone(&sink);
                let child = cx.mount(Mount::from_fn(move |cx: &mut Cx<'_>| {
                    *sink.borrow_mut() = cx.context::<String>("locale");
                    cx.set_context("locale", String::from("de"), true)?;
                    Ok(vec![Child::Dom(cx.comment(""))])
                }))?;
                Ok(vec![Child::Host(child)])
            }),
            body,
        )
        .unwrap();

    assert_eq!(seen.borrow().as_deref().map(String::as_str), Some("fr"));
    assert_eq!(
        rt.context::<String>(host, "locale").as_deref().map(String::as_str),
        Some("fr")
    );
    assert!(matches!(
        rt.set_context(host, "locale", String::from("es"), true),
        Err(RuntimeError::ContextFrozen { .. })
    ));
}

/// Counts updates and re-reads the observed value.
struct Counter {
    model: NodeId,
    updates: Rc<RefCell<Vec<String>>>,
}

impl Component for Counter {
    fn render(&mut self, cx: &mut Cx<'_>) -> Result<Vec<Child>, RuntimeError> {
        cx.observe(self.model, "count")?;
        cx.observe(self.model, "label")?;
        let span = cx.element("span");
        let text = cx.bound_text(self.model, "count")?;
        cx.append(span, text)?;
        Ok(vec![Child::Dom(span)])
    }

    fn update(&mut self, cx: &mut Cx<'_>, path: &[Key]) -> Result<(), RuntimeError> {
        let count = cx.graph().get(self.model, "count").to_text();
        self.updates
            .borrow_mut()
            .push(format!("{}={count}", path_string(path)));
        Ok(())
    }
}

#[test]
fn updates_coalesce_per_host_per_tick() {
    let mut rt = Runtime::new();
    let body = rt.doc().create_element("body");
    let model = rt.graph().vm_object([("count", Value::from(0)), ("label", Value::from("x"))]);
    let updates: Rc<RefCell<Vec<String>>> = Rc::default();
    let host = rt
        .mount_root(
            Mount::new(Counter {
                model,
                updates: Rc::clone(&updates),
            }),
            body,
        )
        .unwrap();

    rt.graph().set(model, "count", 1).unwrap();
    rt.graph().set(model, "count", 2).unwrap();
    rt.graph().set(model, "label", "y").unwrap();
    rt.tick().unwrap();
    assert_eq!(*updates.borrow(), vec!["label=2"]);
    assert_eq!(rt.doc().inner_html(body), "<span>2</span>");

    rt.destroy(host, true);
    rt.graph().set(model, "count", 3).unwrap();
    assert_eq!(rt.tick().unwrap(), 0);
    assert_eq!(updates.borrow().len(), 1);
}

#[test]
fn owned_nodes_die_with_their_host() {
    let mut rt = Runtime::new();
    let body = rt.doc().create_element("body");
    let local: Rc<RefCell<Option<NodeId>>> = Rc::default();
    let sink = Rc::clone(&local);
    let host = rt
        .mount_root(
            Mount::from_fn(move |cx: &mut Cx<'_>| {
                let state = cx.graph().vm_object([("open", false)]);
                cx.own_node(state);
                *sink.borrow_mut() = Some(state);
                Ok(vec![Child::Dom(cx.comment("state"))])
            }),
            body,
        )
        .unwrap();
    let state = local.borrow().expect("rendered");
    assert!(rt.graph().contains(state));
    rt.destroy(host, false);
    assert!(!rt.graph().contains(state));
    assert_eq!(rt.doc().inner_html(body), "<!--state-->", "dom kept without remove_dom");
}

#[test]
fn hidden_children_dom_is_freed_with_the_root() {
    let journal = Journal::default();
    let mut rt = Runtime::new();
    let body = rt.doc().create_element("body");
    let root = Journaled::mount("root", &journal).with("leaf").with_hidden("portal");
    let host = rt.mount_root(Mount::new(root), body).unwrap();
    assert_eq!(rt.doc().live_nodes(), 3, "body, leaf div and the unattached portal div");
    rt.destroy(host, true);
    assert_eq!(rt.doc().live_nodes(), 1);
}

#[test]
fn churn_then_teardown_returns_every_resource() {
    let mut rt = Runtime::new();
    let body = rt.doc().create_element("body");
    let row = rt.graph().vm_object([("id", "r")]);
    let rows = rt.graph().vm_array(Vec::<Value>::new());
    let dom_before = rt.doc().live_nodes();
    let nodes_before = rt.graph().live_nodes();
    // Attrs belong to the host they are mounted with.
    let toggle = rt.graph().attrs([(If::EXPECT, true)]).unwrap();

    let page = rt
        .mount_root(
            Mount::from_fn(move |cx: &mut Cx<'_>| {
                let block = cx.mount(Mount::new(If::new()).attrs(toggle).slot(
                    If::THEN,
                    move |cx: &mut Cx<'_>| {
                        let list = cx.graph().attrs([(For::LOOP, rows)])?;
                        let items = cx.mount(Mount::new(For::new(KeyMode::Each)).attrs(list).slot(
                            For::DEFAULT,
                            |cx: &mut Cx<'_>| {
                                let li = cx.element("li");
                                let each = cx.attrs();
                                let text = cx.bound_text(each, "each.id")?;
                                cx.append(li, text)?;
                                Ok(vec![Child::Dom(li)])
                            },
                        ))?;
                        Ok(vec![Child::Host(items)])
                    },
                ))?;
                Ok(vec![Child::Host(block)])
            }),
            body,
        )
        .unwrap();
    let dom_mounted = rt.doc().live_nodes();
    let hosts_mounted = rt.live_hosts();

    for round in 0..10 {
        rt.graph().push(rows, [row]).unwrap();
        rt.tick().unwrap();
        rt.graph().pop(rows).unwrap();
        rt.tick().unwrap();
        rt.graph().set(toggle, If::EXPECT, round % 2 == 1).unwrap();
        rt.tick().unwrap();
    }
    assert_eq!(rt.doc().inner_html(body), "<!---->");
    assert_eq!(rt.doc().live_nodes(), dom_mounted);
    assert_eq!(rt.live_hosts(), hosts_mounted);

    rt.destroy(page, true);
    assert_eq!(rt.doc().live_nodes(), dom_before);
    assert_eq!(rt.live_hosts(), 0);
    assert_eq!(rt.graph().live_nodes(), nodes_before);
}

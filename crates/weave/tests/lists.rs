#![forbid(unsafe_code)]

//! Keyed list reconciliation through the `For` component.

use proptest::prelude::*;
use weave::prelude::*;
use weave::runtime::reconcile::{Edit, InsertAt, Placement, plan};

struct Fixture {
    rt: Runtime,
    ul: DomId,
    list: HostId,
    attrs: NodeId,
    rows: NodeId,
}

impl Fixture {
    /// `<ul>` with one `<li>{each.id}</li>` per row, followed by a footer
    /// comment.
    fn new(mode: KeyMode, ids: &[&str]) -> Self {
        let mut rt = Runtime::new();
        let ul = rt.doc().create_element("ul");
        let values: Vec<Value> = ids.iter().map(|id| Value::Node(row(rt.graph(), id))).collect();
        let rows = rt.graph().vm_array(values);
        let attrs = rt.graph().attrs([(For::LOOP, rows)]).unwrap();
        let list = rt
            .mount_root(
                Mount::new(For::new(mode))
                    .attrs(attrs)
                    .slot(For::DEFAULT, |cx: &mut Cx<'_>| {
                        let li = cx.element("li");
                        let each = cx.attrs();
                        let text = cx.bound_text(each, "each.id")?;
                        cx.append(li, text)?;
                        Ok(vec![Child::Dom(li)])
                    }),
                ul,
            )
            .unwrap();
        let footer = rt.doc().create_comment("end");
        rt.doc().append_child(ul, footer).unwrap();
        Self {
            rt,
            ul,
            list,
            attrs,
            rows,
        }
    }

    fn graph(&self) -> &Graph {
        self.rt.graph()
    }

    fn html(&self) -> String {
        self.rt.doc().inner_html(self.ul)
    }

    fn hosts(&self) -> Vec<Child> {
        self.rt.root_nodes(self.list)
    }

    fn item_dom(&self) -> Vec<DomId> {
        self.hosts()
            .into_iter()
            .flat_map(|child| self.rt.dom_nodes(child))
            .collect()
    }
}

fn row(graph: &Graph, id: &str) -> NodeId {
    graph.vm_object([("id", id)])
}

fn expected(ids: &[&str]) -> String {
    if ids.is_empty() {
        return "<!----><!--end-->".to_string();
    }
    let items: String = ids.iter().map(|id| format!("<li>{id}</li>")).collect();
    items + "<!--end-->"
}

#[test]
fn append_reuses_existing_items() {
    let script = plan(&["A", "B"], &["A", "B", "C"]);
    assert_eq!((script.creates(), script.keeps(), script.moves()), (1, 2, 0));
    assert_eq!(
        script.edits.last(),
        Some(&Edit::Insert {
            items: vec![Placement::Create { new: 2 }],
            at: InsertAt::End,
        })
    );

    let mut fx = Fixture::new(KeyMode::Each, &["A", "B"]);
    assert_eq!(fx.html(), expected(&["A", "B"]));
    let before = fx.item_dom();
    fx.rt.doc().reset_stats();

    let c = row(fx.graph(), "C");
    fx.graph().push(fx.rows, [c]).unwrap();
    fx.rt.tick().unwrap();

    assert_eq!(fx.html(), expected(&["A", "B", "C"]));
    assert_eq!(&fx.item_dom()[..2], &before[..]);
    // li <- text, fragment <- li, ul <- fragment
    assert_eq!(fx.rt.doc().stats().inserts, 3);
}

#[test]
fn rotation_moves_one_item() {
    let script = plan(&["A", "B", "C"], &["C", "A", "B"]);
    assert_eq!((script.creates(), script.destroys(), script.moves()), (0, 0, 1));

    let mut fx = Fixture::new(KeyMode::property("id"), &["A", "B", "C"]);
    let hosts = fx.hosts();
    let last = fx.graph().pop(fx.rows).unwrap();
    fx.graph().unshift(fx.rows, [last]).unwrap();
    fx.rt.tick().unwrap();

    assert_eq!(fx.html(), expected(&["C", "A", "B"]));
    assert_eq!(fx.hosts(), vec![hosts[2], hosts[0], hosts[1]]);
}

#[test]
fn duplicate_key_is_recreated_and_reported() {
    let script = plan(&["k"], &["k", "k"]);
    assert_eq!((script.keeps(), script.creates()), (1, 1));
    assert_eq!(script.duplicates.len(), 1);

    let mut fx = Fixture::new(KeyMode::property("id"), &["k"]);
    let original = fx.hosts();
    let twin = row(fx.graph(), "k");
    fx.graph().push(fx.rows, [twin]).unwrap();
    fx.rt.tick().expect("duplicates are not errors");

    assert_eq!(fx.html(), expected(&["k", "k"]));
    assert_eq!(fx.hosts()[0], original[0]);
    let reported = fx.rt.diagnostics().take();
    assert!(matches!(
        reported.as_slice(),
        [Diagnostic::DuplicateKey { first: 0, duplicate: 1, .. }]
    ));
}

#[test]
fn emptying_and_refilling_keeps_one_placeholder() {
    let mut fx = Fixture::new(KeyMode::Index, &["x", "y"]);
    assert_eq!(fx.html(), expected(&["x", "y"]));

    fx.graph().set_len(fx.rows, 0).unwrap();
    fx.rt.tick().unwrap();
    assert_eq!(fx.html(), expected(&[]));
    assert_eq!(fx.rt.live_hosts(), 1);

    let z = row(fx.graph(), "z");
    fx.graph().push(fx.rows, [z]).unwrap();
    fx.rt.tick().unwrap();
    assert_eq!(fx.html(), expected(&["z"]));
}

#[test]
fn item_edits_do_not_reconcile() {
    let mut fx = Fixture::new(KeyMode::Each, &["a"]);
    let hosts = fx.hosts();
    let Value::Node(a) = fx.graph().get(fx.rows, 0_usize) else {
        panic!("row is a node");
    };

    fx.rt.doc().reset_stats();
    fx.graph().set(a, "id", "renamed").unwrap();
    fx.rt.tick().unwrap();
    assert_eq!(fx.html(), expected(&["renamed"]));
    assert_eq!(fx.hosts(), hosts);
    assert_eq!(fx.rt.doc().stats().inserts, 0);
    assert_eq!(fx.rt.doc().stats().text_writes, 1);
}

#[test]
fn replacing_the_array_reconciles_by_key() {
    let mut fx = Fixture::new(KeyMode::property("id"), &["a", "b"]);
    let hosts = fx.hosts();
    let values: Vec<Value> = ["b", "c"].iter().map(|id| Value::Node(row(fx.graph(), id))).collect();
    let fresh = fx.graph().vm_array(values);
    fx.graph().set(fx.attrs, For::LOOP, fresh).unwrap();
    fx.rt.tick().unwrap();

    assert_eq!(fx.html(), expected(&["b", "c"]));
    assert_eq!(fx.hosts()[0], hosts[1], "`b` keeps its host across arrays");
}

const IDS: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

fn orders() -> impl Strategy<Value = Vec<Vec<usize>>> {
    let one = proptest::sample::subsequence((0..IDS.len()).collect::<Vec<_>>(), 0..=IDS.len())
        .prop_shuffle();
    proptest::collection::vec(one, 1..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn dom_tracks_data_and_hosts_survive(steps in orders()) {
        let mut fx = Fixture::new(KeyMode::Each, &[]);
        let pool: Vec<NodeId> = IDS.iter().map(|id| row(fx.graph(), id)).collect();
        let mut previous: Vec<(usize, Child)> = Vec::new();

        for order in steps {
            let values: Vec<Value> = order.iter().map(|&i| Value::Node(pool[i])).collect();
            let arr = fx.graph().vm_array(values);
            fx.graph().set(fx.attrs, For::LOOP, arr).unwrap();
            fx.rt.tick().unwrap();

            let ids: Vec<&str> = order.iter().map(|&i| IDS[i]).collect();
            prop_assert_eq!(fx.html(), expected(&ids));

            let current: Vec<(usize, Child)> = if order.is_empty() {
                Vec::new()
            } else {
                order.iter().copied().zip(fx.hosts()).collect()
            };
            for (id, host) in &current {
                if let Some((_, old)) = previous.iter().find(|(prev, _)| prev == id) {
                    prop_assert_eq!(old, host, "host for {} was recreated", IDS[*id]);
                }
            }
            previous = current;
        }
    }
}

//! Integration tests: rule matching and effective property resolution.
//!
//! Builds small diagrams through units of work, attaches rules to the
//! default layer and checks what the resolver reports.

use dg_core::search::Relation;
use dg_core::stylesheet::{self, Stylesheet, StylesheetKind, is_selection_dirty};
use dg_core::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn layer() -> LayerId {
    LayerId::intern("default")
}

fn props(value: serde_json::Value) -> ElementProps {
    ElementProps::from_json_paths(&value).unwrap()
}

fn fill(hex: &str) -> RuleAction {
    RuleAction::SetProps {
        kind: PropCategory::Fill,
        props: props(json!({"fill.color": hex})),
    }
}

fn tags(tags: &[&str]) -> ElementSearchClause {
    ElementSearchClause::Tags {
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn node_rule(id: &str, clauses: Vec<ElementSearchClause>, actions: Vec<RuleAction>) -> AdjustmentRule {
    AdjustmentRule::simple(id, ElementType::Node, clauses, actions).unwrap()
}

fn build(elements: Vec<Element>, rules: Vec<AdjustmentRule>) -> Diagram {
    let mut d = Diagram::new();
    UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
        for el in elements {
            uow.add_element(None, el)?;
        }
        uow.update_layer(layer(), |l| l.rules = rules)
    })
    .unwrap();
    d
}

fn effective(d: &Diagram, id: &str) -> EffectiveProps {
    let query = FilterQuery::new();
    Resolver::new(d, &query).effective(ElementId::intern(id)).unwrap()
}

fn hex(color: Option<Color>) -> Option<String> {
    color.map(|c| c.to_hex())
}

// ─── Matching ───────────────────────────────────────────────────────────

#[test]
fn urgent_scenario() {
    init();
    let rule: AdjustmentRule = serde_json::from_value(json!({
        "id": "rr_urgent",
        "type": "node",
        "clauses": [{"type": "tags", "tags": ["urgent"]}],
        "actions": [{"type": "set-props", "kind": "fill", "props": {"fill": {"color": "#ff0000"}}}]
    }))
    .unwrap();
    let d = build(
        vec![
            Element::node(ElementId::intern("rr_n1"), "rect", layer()).with_tag("urgent"),
            Element::node(ElementId::intern("rr_n2"), "rect", layer()),
        ],
        vec![rule],
    );

    assert_eq!(hex(effective(&d, "rr_n1").props.fill.color).as_deref(), Some("#FF0000"));
    assert_eq!(hex(effective(&d, "rr_n2").props.fill.color).as_deref(), Some("#FFFFFF"));
}

#[test]
fn resolution_is_deterministic() {
    let d = build(
        vec![Element::node(ElementId::intern("rr_det"), "rect", layer()).with_tag("a")],
        vec![node_rule("rr_det_rule", vec![tags(&["a"])], vec![fill("#123456")])],
    );
    let first = effective(&d, "rr_det");
    for _ in 0..3 {
        assert_eq!(effective(&d, "rr_det"), first);
    }
}

#[test]
fn later_rule_wins_and_order_flips_result() {
    let el = || Element::node(ElementId::intern("rr_order"), "rect", layer()).with_tag("a");
    let red = node_rule("rr_red", vec![tags(&["a"])], vec![fill("#FF0000")]);
    let blue = node_rule("rr_blue", vec![tags(&["a"])], vec![fill("#0000FF")]);

    let d = build(vec![el()], vec![red.clone(), blue.clone()]);
    let eff = effective(&d, "rr_order");
    assert_eq!(hex(eff.props.fill.color).as_deref(), Some("#0000FF"));
    assert_eq!(eff.matched.as_slice(), &[RuleId::intern("rr_red"), RuleId::intern("rr_blue")]);

    let d = build(vec![el()], vec![blue, red]);
    assert_eq!(hex(effective(&d, "rr_order").props.fill.color).as_deref(), Some("#FF0000"));
}

#[test]
fn clause_list_is_and_any_is_or() {
    let and_rule = node_rule(
        "rr_and",
        vec![
            tags(&["A"]),
            ElementSearchClause::Props {
                path: "type".into(),
                relation: Relation::Eq,
                value: json!("x"),
            },
        ],
        vec![RuleAction::Hide],
    );
    let d = build(
        vec![
            Element::node(ElementId::intern("rr_ax"), "x", layer()).with_tag("A"),
            Element::node(ElementId::intern("rr_ay"), "y", layer()).with_tag("A"),
            Element::node(ElementId::intern("rr_bx"), "x", layer()).with_tag("B"),
        ],
        vec![and_rule],
    );
    assert!(effective(&d, "rr_ax").hidden);
    assert!(!effective(&d, "rr_ay").hidden);
    assert!(!effective(&d, "rr_bx").hidden);

    let or_rule = node_rule(
        "rr_or",
        vec![ElementSearchClause::Any {
            clauses: vec![tags(&["A"]), tags(&["B"])],
        }],
        vec![RuleAction::Hide],
    );
    let d = build(
        vec![
            Element::node(ElementId::intern("rr_oa"), "x", layer()).with_tag("A"),
            Element::node(ElementId::intern("rr_ob"), "x", layer()).with_tag("B"),
            Element::node(ElementId::intern("rr_oc"), "x", layer()).with_tag("C"),
        ],
        vec![or_rule],
    );
    assert!(effective(&d, "rr_oa").hidden);
    assert!(effective(&d, "rr_ob").hidden);
    assert!(!effective(&d, "rr_oc").hidden);
}

#[test]
fn empty_any_matches_nothing() {
    let d = build(
        vec![Element::node(ElementId::intern("rr_empty_any"), "x", layer())],
        vec![node_rule(
            "rr_empty_any_rule",
            vec![ElementSearchClause::Any { clauses: vec![] }],
            vec![RuleAction::Hide],
        )],
    );
    assert!(!effective(&d, "rr_empty_any").hidden);
}

#[test]
fn edge_rules_skip_nodes() {
    let edge_rule = AdjustmentRule::simple("rr_edges", ElementType::Edge, vec![], vec![RuleAction::Hide]).unwrap();
    let a = ElementId::intern("rr_ea");
    let b = ElementId::intern("rr_eb");
    let d = build(
        vec![
            Element::node(a, "rect", layer()),
            Element::node(b, "rect", layer()),
            Element::edge(ElementId::intern("rr_e"), Some(a), Some(b), layer()),
        ],
        vec![edge_rule],
    );
    assert!(effective(&d, "rr_e").hidden);
    assert!(!effective(&d, "rr_ea").hidden);
}

#[test]
fn malformed_query_is_no_match() {
    init();
    let rule = node_rule(
        "rr_badq",
        vec![ElementSearchClause::Query {
            query: ".tags | contains(".into(),
        }],
        vec![RuleAction::Hide],
    );
    let later = node_rule("rr_after_badq", vec![], vec![fill("#00FF00")]);
    let d = build(
        vec![Element::node(ElementId::intern("rr_q"), "rect", layer())],
        vec![rule, later],
    );
    let eff = effective(&d, "rr_q");
    assert!(!eff.hidden);
    assert_eq!(hex(eff.props.fill.color).as_deref(), Some("#00FF00"));
}

// ─── Hide and stylesheets ───────────────────────────────────────────────

#[test]
fn hidden_elements_keep_full_props() {
    let d = build(
        vec![Element::node(ElementId::intern("rr_hid"), "rect", layer()).with_tag("secret")],
        vec![
            node_rule("rr_hide", vec![tags(&["secret"])], vec![RuleAction::Hide]),
            node_rule("rr_after_hide", vec![tags(&["secret"])], vec![fill("#ABCDEF")]),
        ],
    );
    let eff = effective(&d, "rr_hid");
    assert!(eff.hidden);
    assert_eq!(hex(eff.props.fill.color).as_deref(), Some("#ABCDEF"));
    assert_eq!(eff.props.text.font_size, Some(12.0));

    let query = FilterQuery::new();
    let resolver = Resolver::new(&d, &query);
    assert!(resolver.visible_elements().is_empty());
}

#[test]
fn set_props_lands_on_rule_selected_stylesheet() {
    let mut d = Diagram::new();
    let el = ElementId::intern("rr_two_pass");
    UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
        stylesheet::add_stylesheet(
            uow,
            Stylesheet::new("rr_alert", "Alert", StylesheetKind::Node)
                .with_props(props(json!({"fill.color": "#FF0000", "stroke.width": 5}))),
        )?;
        uow.add_element(None, Element::node(el, "rect", layer()).with_tag("t"))?;
        // The set-props rule comes first, the stylesheet swap second.
        uow.update_layer(layer(), |l| {
            l.rules = vec![
                node_rule("rr_tp_fill", vec![tags(&["t"])], vec![fill("#0000FF")]),
                node_rule(
                    "rr_tp_sheet",
                    vec![tags(&["t"])],
                    vec![RuleAction::SetStylesheet {
                        stylesheet: StylesheetId::intern("rr_alert"),
                        text_stylesheet: None,
                    }],
                ),
            ]
        })
    })
    .unwrap();

    let eff = effective(&d, "rr_two_pass");
    assert_eq!(eff.stylesheet, StylesheetId::intern("rr_alert"));
    assert_eq!(hex(eff.props.fill.color).as_deref(), Some("#0000FF"));
    assert_eq!(eff.props.stroke.width, Some(5.0));
    // The binding itself is untouched.
    assert_eq!(d.lookup(el).unwrap().metadata.stylesheet, None);
}

#[test]
fn broken_stylesheet_falls_back_but_keeps_hidden() {
    init();
    let mut d = Diagram::new();
    UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
        stylesheet::add_stylesheet(uow, Stylesheet::new("rr_cyc_a", "A", StylesheetKind::Node))?;
        stylesheet::add_stylesheet(
            uow,
            Stylesheet::new("rr_cyc_b", "B", StylesheetKind::Node)
                .with_parent(StylesheetId::intern("rr_cyc_a")),
        )?;
        // Close the loop behind the store's back, as a corrupt document would.
        uow.update_stylesheet(StylesheetId::intern("rr_cyc_a"), |s| {
            s.parent = Some(StylesheetId::intern("rr_cyc_b"))
        })?;
        uow.add_element(
            None,
            Element::node(ElementId::intern("rr_cyc"), "rect", layer())
                .with_stylesheet(StylesheetId::intern("rr_cyc_a"))
                .with_props(props(json!({"fill.color": "#FF0000"})))
                .with_tag("gone"),
        )?;
        uow.update_layer(layer(), |l| {
            l.rules = vec![node_rule("rr_cyc_hide", vec![tags(&["gone"])], vec![RuleAction::Hide])]
        })
    })
    .unwrap();

    let eff = effective(&d, "rr_cyc");
    assert_eq!(
        eff.error,
        Some(ConfigError::StylesheetCycle(StylesheetId::intern("rr_cyc_a")))
    );
    assert!(eff.hidden);
    assert_eq!(hex(eff.props.fill.color).as_deref(), Some("#FFFFFF"));
    effective(&d, "rr_cyc");
    assert_eq!(d.diagnostics.reported().len(), 1);
}

#[test]
fn rule_naming_unknown_stylesheet_is_config_error() {
    let d = build(
        vec![Element::node(ElementId::intern("rr_unk"), "rect", layer())],
        vec![node_rule(
            "rr_unk_rule",
            vec![],
            vec![RuleAction::SetStylesheet {
                stylesheet: StylesheetId::intern("rr_nowhere"),
                text_stylesheet: None,
            }],
        )],
    );
    let eff = effective(&d, "rr_unk");
    assert_eq!(
        eff.error,
        Some(ConfigError::RuleUnknownStylesheet {
            rule: RuleId::intern("rr_unk_rule"),
            stylesheet: StylesheetId::intern("rr_nowhere"),
        })
    );
}

#[test]
fn props_clauses_see_base_not_rule_output() {
    // The second rule would match only if it saw the first rule's output.
    let d = build(
        vec![Element::node(ElementId::intern("rr_base"), "rect", layer())],
        vec![
            node_rule("rr_base_set", vec![], vec![fill("#FF0000")]),
            node_rule(
                "rr_base_check",
                vec![ElementSearchClause::Props {
                    path: "fill.color".into(),
                    relation: Relation::Eq,
                    value: json!("#FF0000"),
                }],
                vec![RuleAction::Hide],
            ),
        ],
    );
    assert!(!effective(&d, "rr_base").hidden);
}

// ─── Advanced rules ─────────────────────────────────────────────────────

#[test]
fn advanced_rule_inline_actions() {
    let expression =
        r##".elements[] | select(.type == "diamond") | {id, hide: .data.flow.skip, props: {"fill.color": "#00FF00"}}"##;
    let mut skipped = Element::node(ElementId::intern("rr_adv_skip"), "diamond", layer());
    skipped.metadata.data.insert("flow".into(), json!({"skip": true}));
    let d = build(
        vec![
            Element::node(ElementId::intern("rr_adv_d"), "diamond", layer()),
            skipped,
            Element::node(ElementId::intern("rr_adv_r"), "rect", layer()),
        ],
        vec![AdjustmentRule::advanced("rr_adv", expression, vec![])],
    );

    let eff = effective(&d, "rr_adv_d");
    assert_eq!(hex(eff.props.fill.color).as_deref(), Some("#00FF00"));
    assert!(!eff.hidden);
    assert_eq!(eff.matched.as_slice(), &[RuleId::intern("rr_adv")]);

    assert!(effective(&d, "rr_adv_skip").hidden);
    let plain = effective(&d, "rr_adv_r");
    assert!(plain.matched.is_empty());
    assert_eq!(hex(plain.props.fill.color).as_deref(), Some("#FFFFFF"));
}

#[test]
fn advanced_ids_only_mark_matches() {
    let d = build(
        vec![
            Element::node(ElementId::intern("rr_ids_a"), "rect", layer()).with_name("first"),
            Element::node(ElementId::intern("rr_ids_b"), "rect", layer()),
        ],
        vec![AdjustmentRule::advanced(
            "rr_ids",
            r#"[.elements[] | select(.name == "first") | .id]"#,
            vec![],
        )],
    );
    assert_eq!(effective(&d, "rr_ids_a").matched.as_slice(), &[RuleId::intern("rr_ids")]);
    assert!(effective(&d, "rr_ids_b").matched.is_empty());
}

#[test]
fn advanced_actions_respect_element_type() {
    let elements = || {
        vec![
            Element::node(ElementId::intern("rr_het_n"), "rect", layer()),
            Element::edge(ElementId::intern("rr_het_e"), None, None, layer()),
        ]
    };
    let expression = r#"(.elements[] | select(.kind == "node") | {id, props: {"line.curve": "step", "opacity": 0.5}}), (.elements[] | select(.kind == "edge") | {id, hide: true, stylesheet: "default-edge", textStylesheet: "default-text-default"})"#;
    let plain = build(elements(), vec![]);
    let d = build(
        elements(),
        vec![AdjustmentRule::advanced("rr_het", expression, vec![])],
    );

    // The line action is dropped for the node; its opacity still lands.
    let node = effective(&d, "rr_het_n");
    assert_eq!(node.props.line, effective(&plain, "rr_het_n").props.line);
    assert_eq!(node.props.opacity, Some(0.5));

    // Edges take no text stylesheet, so the whole stylesheet action goes.
    let edge = effective(&d, "rr_het_e");
    let edge_plain = effective(&plain, "rr_het_e");
    assert!(edge.hidden);
    assert_eq!(edge.text_stylesheet, edge_plain.text_stylesheet);
    assert_eq!(edge.matched.as_slice(), &[RuleId::intern("rr_het")]);
}

// ─── Dirty detection ────────────────────────────────────────────────────

#[test]
fn dirty_detection_is_content_based() {
    let mut d = Diagram::new();
    let el = ElementId::intern("rr_dirty");
    UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
        stylesheet::add_stylesheet(
            uow,
            Stylesheet::new("rr_dirty_sheet", "S", StylesheetKind::Node)
                .with_props(props(json!({"fill.color": "#FF0000"}))),
        )?;
        uow.add_element(
            None,
            Element::node(el, "rect", layer()).with_stylesheet(StylesheetId::intern("rr_dirty_sheet")),
        )
    })
    .unwrap();
    d.set_selection(&[el]);
    assert!(!is_selection_dirty(&d, false));

    // An override equal to the inherited value is not dirty.
    UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
        uow.set_prop(el, PropPath::FillColor, Color::from_hex("#FF0000").map(PropValue::Color))
    })
    .unwrap();
    assert!(!is_selection_dirty(&d, false));

    UnitOfWork::execute(&mut d, UowOptions::default(), |uow| {
        uow.set_prop(el, PropPath::FillColor, Color::from_hex("#0000FF").map(PropValue::Color))
    })
    .unwrap();
    assert!(is_selection_dirty(&d, false));
    assert!(!is_selection_dirty(&d, true));
}

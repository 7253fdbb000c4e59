//! Re-serializing a query and parsing it again yields the same AST

use chrono::NaiveDate;
use curio::query::{
    parse, CollectMode, FilterArgs, FilterMethod, FilterOp, Having, ObjectQuery, QueryAst, RelationStep, Step,
};
use curio::Value;
use proptest::prelude::*;

fn identifier() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,6}"
}

fn model_name() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z]{0,6}"
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-10_000i32..10_000).prop_map(|i| Value::Float(f64::from(i) / 4.0)),
        "[a-zA-Z0-9 _'-]{0,10}".prop_map(Value::String),
        "[a-zA-Z0-9 _\"]{0,10}".prop_map(Value::String),
        (2000i32..2030, 1u32..13, 1u32..29, 0u32..24, 0u32..60).prop_map(|(y, m, d, h, min)| {
            let dt = NaiveDate::from_ymd_opt(y, m, d)
                .and_then(|date| date.and_hms_opt(h, min, 0))
                .unwrap();
            Value::DateTime(dt)
        }),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => scalar(),
        1 => prop::collection::vec(scalar(), 1..4).prop_map(Value::List),
    ]
}

fn kwargs() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::vec((identifier(), value()), 0..3)
}

fn filter_op() -> impl Strategy<Value = FilterOp> {
    prop_oneof![
        kwargs().prop_map(|kw| FilterOp::new(FilterMethod::Filter, FilterArgs::Kwargs(kw))),
        kwargs().prop_map(|kw| FilterOp::new(FilterMethod::Exclude, FilterArgs::Kwargs(kw))),
        (
            prop::sample::select(vec![
                FilterMethod::Count,
                FilterMethod::Sum,
                FilterMethod::Avg,
                FilterMethod::Min,
                FilterMethod::Max,
                FilterMethod::Order,
            ]),
            identifier()
        )
            .prop_map(|(method, field)| FilterOp::field(method, field)),
        (
            prop::sample::select(vec![
                FilterMethod::Start,
                FilterMethod::Limit,
                FilterMethod::First,
                FilterMethod::Last,
            ]),
            0i64..100
        )
            .prop_map(|(method, n)| FilterOp::int(method, n)),
    ]
}

fn seed() -> impl Strategy<Value = ObjectQuery> {
    (model_name(), kwargs(), prop::collection::vec(filter_op(), 0..3)).prop_map(|(model, first, rest)| {
        let mut seed = ObjectQuery::new(model).with_filter(FilterOp::new(FilterMethod::Filter, FilterArgs::Kwargs(first)));
        for op in rest {
            seed = seed.with_filter(op);
        }
        seed
    })
}

fn relation_step() -> impl Strategy<Value = Step> {
    (
        model_name(),
        identifier(),
        prop::collection::vec(filter_op(), 0..3),
        prop::option::of(prop::sample::select(vec![
            CollectMode::All,
            CollectMode::Until,
            CollectMode::Search,
            CollectMode::Terminal,
        ])),
    )
        .prop_map(|(model, relation, filters, recursion)| {
            let mut step = RelationStep::new(model, relation);
            step.filters = filters;
            step.recursion = recursion;
            Step::relation(step)
        })
}

/// Steps of a sub-chain; joins only appear at the top level
fn step(depth: u32) -> BoxedStrategy<Step> {
    if depth == 0 {
        return relation_step().boxed();
    }
    let chain = prop::collection::vec(step(depth - 1), 1..3);
    prop_oneof![
        3 => relation_step(),
        1 => (
            chain.clone(),
            prop::option::of(prop::sample::select(vec![Having::Present, Having::Absent, Having::Optional]))
        )
            .prop_map(|(steps, having)| Step::subquery(steps, having)),
        1 => prop::collection::vec(chain, 2..4).prop_map(Step::or),
    ]
    .boxed()
}

fn query() -> impl Strategy<Value = QueryAst> {
    (seed(), prop::collection::vec((step(2), any::<bool>()), 0..4)).prop_map(|(seed, steps)| QueryAst {
        seed,
        steps: steps
            .into_iter()
            .map(|(step, join)| if join { step.joined() } else { step })
            .collect(),
    })
}

proptest! {
    #[test]
    fn prop_display_parses_back(ast in query()) {
        let text = ast.to_string();
        let reparsed = parse(&text);
        prop_assert!(reparsed.is_ok(), "{} failed: {:?}", text, reparsed);
        prop_assert_eq!(reparsed.unwrap(), ast);
    }
}

#[test]
fn test_display_examples() {
    for text in [
        "Blog(id=1), Blog.entry_set(rating__gte=4) ?(Entry.comment_set)",
        "Entry(id=1) Entry.responses(headline__icontains=\"graph\")? (Entry.authors)",
        "Entry() (Entry.authors) | (Entry.responses Entry.authors)",
        "Entry(blog=[1, 2]).count(authors)(authors__count__gt=1).last(2)",
    ] {
        let ast = parse(text).unwrap();
        assert_eq!(ast.to_string(), text);
    }
}

use bson::{doc, Bson};
use proptest::prelude::*;
use serde_json::json;

use docmap::{aql::AqlTranslator, prelude::*};

#[derive(Debug, Clone)]
enum Step {
    Where(String, &'static str, Bson),
    Or(String, &'static str, Bson),
    Sort(String, i64),
    Limit(usize),
    Skip(usize),
    Fields(Vec<String>),
}

fn field() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("status"),
        Just("age"),
        Just("author.name"),
        Just("tags"),
        Just("id"),
    ]
    .prop_map(String::from)
}

fn scalar() -> impl Strategy<Value = Bson> {
    prop_oneof![
        any::<i32>().prop_map(Bson::Int32),
        any::<bool>().prop_map(Bson::Boolean),
        "[a-z]{0,8}".prop_map(Bson::String),
    ]
}

fn predicate() -> impl Strategy<Value = (&'static str, Bson)> {
    prop_oneof![
        (
            prop_oneof![Just("eq"), Just("ne"), Just("gt"), Just("gte"), Just("lt"), Just("lte")],
            scalar(),
        ),
        (
            prop_oneof![Just("in"), Just("nin")],
            prop::collection::vec(scalar(), 0..4).prop_map(Bson::Array),
        ),
        any::<bool>().prop_map(|should_exist| ("exists", Bson::Boolean(should_exist))),
    ]
}

fn count() -> impl Strategy<Value = usize> {
    prop_oneof![0_usize..100, any::<usize>(), Just(usize::MAX)]
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (field(), predicate()).prop_map(|(field, (op, value))| Step::Where(field, op, value)),
        2 => (field(), predicate()).prop_map(|(field, (op, value))| Step::Or(field, op, value)),
        1 => (field(), prop_oneof![Just(1_i64), Just(-1), Just(7), Just(-3)])
            .prop_map(|(field, direction)| Step::Sort(field, direction)),
        1 => count().prop_map(Step::Limit),
        1 => count().prop_map(Step::Skip),
        1 => prop::collection::vec(field(), 1..3).prop_map(Step::Fields),
    ]
}

fn build(steps: &[Step]) -> QueryModel {
    let mut model = QueryModel::new();

    for step in steps {
        match step {
            Step::Where(field, op, value) => {
                model.where_(field.as_str()).op(op, value.clone()).unwrap();
            }
            Step::Or(field, op, value) => {
                if let Ok(clause) = model.or(field.as_str()) {
                    clause.op(op, value.clone()).unwrap();
                }
            }
            Step::Sort(field, direction) => {
                model.sort(field.as_str(), *direction).unwrap();
            }
            Step::Limit(limit) => {
                model.limit(*limit);
            }
            Step::Skip(skip) => {
                model.skip(*skip);
            }
            Step::Fields(names) => {
                model.fields(names.iter().cloned());
            }
        }
    }

    model
}

proptest! {
    #[test]
    fn filter_object_round_trip_is_lossless(steps in prop::collection::vec(step(), 0..12)) {
        let model = build(&steps);
        let parsed = QueryModel::from_filter(&model.to_filter()).unwrap();
        prop_assert_eq!(&parsed, &model);

        let translator = AqlTranslator::new();
        prop_assert_eq!(
            translator.translate("collection", &parsed).unwrap(),
            translator.translate("collection", &model).unwrap()
        );
    }
}

#[test]
fn builder_and_filter_object_agree() {
    let mut built = QueryModel::new();
    built
        .where_("status")
        .eq("active")
        .where_("age")
        .gte(18)
        .where_("role")
        .eq("admin")
        .or("role")
        .unwrap()
        .eq("owner");
    built.sort("name", 1).unwrap().limit(10).skip(5).fields(["name", "role"]);

    let parsed = QueryModel::from_filter(&doc! {
        "$where": {
            "$and": [{ "status": "active" }, { "age": { "$gte": 18 } }],
            "$or": [{ "role": "admin" }, { "role": { "$eq": "owner" } }],
        },
        "$sort": [["name", 1]],
        "$limit": 10,
        "$skip": 5,
        "$fields": ["name", ["role"]],
    })
    .unwrap();

    assert_eq!(parsed, built);
}

#[test]
fn json_filters_parse_like_documents() {
    let from_json = QueryModel::from_json(&json!({
        "$where": { "author": { "name": "Ada" }, "tags": { "$in": ["rust"] } },
        "$sort": { "createdAt": -1 },
    }))
    .unwrap();

    let mut built = QueryModel::new();
    built
        .where_("author.name")
        .eq("Ada")
        .where_("tags")
        .in_(["rust"])
        .sort_desc("createdAt");

    assert_eq!(from_json, built);
}

#[test]
fn builder_guard_rails() {
    let mut query = QueryModel::new();

    assert_eq!(
        query.where_("x").op("customOp", 1).unwrap_err(),
        QueryError::InvalidOperator("customOp".into())
    );
    assert_eq!(query.or("x").unwrap_err(), QueryError::PrecedingWhereRequired);
    assert_eq!(query.sort("x", 0).unwrap_err(), QueryError::InvalidSortOrder);
    assert_eq!(
        query.add_predicate("xor", "x", "eq", 1).unwrap_err(),
        QueryError::InvalidLogicalOperator("xor".into())
    );
    assert_eq!(query, QueryModel::new());
}

#[test]
fn malformed_filter_objects_are_rejected() {
    for filter in [
        doc! { "$where": { "x": { "$regex": "a" } } },
        doc! { "$where": { "x": 1, "$nor": [] } },
        doc! { "$where": { "x": { "$exists": "yes" } } },
        doc! { "$limit": -1 },
        doc! { "$sort": [["x", 0]] },
        doc! { "$unknown": 1 },
    ] {
        assert!(QueryModel::from_filter(&filter).is_err(), "{filter} should be rejected");
    }
}

#[tokio::test]
async fn unbound_query_cannot_run() {
    let mut query = Query::new();
    query.where_("x").eq(1);
    assert!(matches!(query.run().await, Err(DocmapError::Unbound(_))));
}

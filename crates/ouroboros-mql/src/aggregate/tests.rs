//! Tests for aggregation expressions.

use super::*;
use crate::expr::Param;
use crate::options::StringTranslationMode;
use crate::test_fixtures::{param, predicate, registry, root, x};

fn project_with(body: Expr, options: TranslationOptions) -> Result<(Document, ResultDeserializer)> {
    let registry = registry();
    ExpressionBuilder::new(&registry, &options).project(&predicate(body))
}

fn project(body: Expr) -> Document {
    project_with(body, TranslationOptions::default()).unwrap().0
}

/// Projection stage of a scalar selector, without the `_id` exclusion
fn value(body: Expr) -> Bson {
    let mut stage = project(body);
    stage.remove("value").unwrap()
}

fn code_points() -> TranslationOptions {
    TranslationOptions::default().string_translation_mode(StringTranslationMode::CodePoints)
}

fn group_param() -> Param {
    Param::new("g", ValueType::array(ValueType::document("Root")))
}

fn g() -> Expr {
    Expr::param(&group_param())
}

fn group(key: Expr, selector: Expr) -> Result<(Document, ResultDeserializer)> {
    let registry = registry();
    let options = TranslationOptions::default();
    ExpressionBuilder::new(&registry, &options)
        .group(&predicate(key), &Expr::lambda(vec![group_param()], selector))
}

fn r() -> Param {
    Param::new("r", ValueType::document("Root"))
}

fn int(name: &str) -> Param {
    Param::new(name, ValueType::Int32)
}

// ---- projections ----

#[test]
fn test_project_new_object() {
    let body = Expr::new_object(
        None,
        vec![
            ("A", x().member("A")),
            ("N", x().member("C").member("E").member("F").add(Expr::int(1))),
        ],
    );
    let (stage, deserializer) = project_with(body, TranslationOptions::default()).unwrap();
    assert_eq!(
        stage,
        doc! { "A": "$A", "N": { "$add": ["$C.E.F", 1] }, "_id": 0 }
    );
    assert_eq!(
        deserializer.shape(),
        &ResultShape::Object(vec![
            ("A".to_string(), ResultShape::computed("A")),
            ("N".to_string(), ResultShape::computed("N")),
        ])
    );
}

#[test]
fn test_project_scalar_is_wrapped_in_value() {
    let (stage, deserializer) =
        project_with(x().member("A"), TranslationOptions::default()).unwrap();
    assert_eq!(stage, doc! { "value": "$A", "_id": 0 });
    assert_eq!(deserializer.shape(), &ResultShape::computed("value"));
}

#[test]
fn test_project_mapped_element_names() {
    assert_eq!(value(x().member("Z")), Bson::String("$z".to_string()));
}

#[test]
fn test_project_selected_id_is_kept() {
    let body = Expr::new_object(None, vec![("_id", x().member("A"))]);
    assert_eq!(project(body), doc! { "_id": "$A" });
}

#[test]
fn test_constants_under_stage_members_are_literal() {
    assert_eq!(value(Expr::int(5)), Bson::Document(doc! { "$literal": 5 }));
    let body = Expr::new_object(None, vec![("A", Expr::string("$x")), ("K", Expr::bool(true))]);
    assert_eq!(
        project(body),
        doc! { "A": { "$literal": "$x" }, "K": { "$literal": true }, "_id": 0 }
    );
}

#[test]
fn test_whole_document() {
    let body = Expr::new_object(None, vec![("Doc", x())]);
    assert_eq!(project(body), doc! { "Doc": "$$ROOT", "_id": 0 });
}

// ---- operators ----

#[test]
fn test_chained_additions_are_flattened() {
    let body = x().member("P").add(Expr::int(1)).add(Expr::int(2));
    assert_eq!(value(body), Bson::Document(doc! { "$add": ["$P", 1, 2] }));
}

#[test]
fn test_string_addition_is_concat() {
    let body = x().member("A").add(Expr::string("-")).add(x().member("B"));
    assert_eq!(value(body), Bson::Document(doc! { "$concat": ["$A", "-", "$B"] }));
}

#[test]
fn test_mixed_operators_nest() {
    let body = x().member("P").multiply(Expr::int(2)).add(Expr::int(1));
    assert_eq!(
        value(body),
        Bson::Document(doc! { "$add": [{ "$multiply": ["$P", 2] }, 1] })
    );
}

#[test]
fn test_comparison_and_logic() {
    let body = x()
        .member("P")
        .gt(Expr::int(1))
        .and_also(x().member("A").ne(Expr::string("a")));
    assert_eq!(
        value(body),
        Bson::Document(doc! { "$and": [{ "$gt": ["$P", 1] }, { "$ne": ["$A", "a"] }] })
    );
}

#[test]
fn test_comparison_literal_uses_field_representation() {
    let body = x().member("LevelName").eq(Expr::enum_value("Level", 2));
    assert_eq!(value(body), Bson::Document(doc! { "$eq": ["$LevelName", "Medium"] }));
}

#[test]
fn test_conditional_and_coalesce() {
    let body = Expr::conditional(x().member("K"), Expr::string("y"), Expr::string("n"));
    assert_eq!(value(body), Bson::Document(doc! { "$cond": ["$K", "y", "n"] }));

    let body = x().member("Q").coalesce(Expr::int(0));
    assert_eq!(value(body), Bson::Document(doc! { "$ifNull": ["$Q", 0] }));
}

#[test]
fn test_not_and_negate() {
    assert_eq!(
        value(x().member("K").not()),
        Bson::Document(doc! { "$not": ["$K"] })
    );
    assert_eq!(
        value(x().member("P").negate()),
        Bson::Document(doc! { "$subtract": [0, "$P"] })
    );
}

#[test]
fn test_nullable_members() {
    assert_eq!(
        value(x().member("Q").member("HasValue")),
        Bson::Document(doc! { "$ne": ["$Q", null] })
    );
    assert_eq!(value(x().member("Q").member("Value")), Bson::String("$Q".to_string()));
}

// ---- dates ----

#[test]
fn test_date_parts() {
    assert_eq!(
        value(x().member("J").member("Year")),
        Bson::Document(doc! { "$year": "$J" })
    );
    assert_eq!(
        value(x().member("J").member("Day")),
        Bson::Document(doc! { "$dayOfMonth": "$J" })
    );
    assert_eq!(
        value(x().member("J").member("DayOfWeek")),
        Bson::Document(doc! { "$subtract": [{ "$dayOfWeek": "$J" }, 1] })
    );
}

#[test]
fn test_date_arithmetic() {
    assert_eq!(
        value(x().member("J").call("AddDays", vec![Expr::int(1)])),
        Bson::Document(doc! { "$add": ["$J", 86_400_000_i64] })
    );
    assert_eq!(
        value(x().member("J").call("AddHours", vec![Expr::int(-2)])),
        Bson::Document(doc! { "$add": ["$J", { "$subtract": [0_i64, 7_200_000_i64] }] })
    );
    assert_eq!(
        value(x().member("J").call("AddMinutes", vec![x().member("P")])),
        Bson::Document(doc! { "$add": ["$J", { "$multiply": ["$P", 60_000_i64] }] })
    );
}

#[test]
fn test_calendar_arithmetic_is_unsupported() {
    let err = project_with(
        x().member("J").call("AddMonths", vec![Expr::int(1)]),
        TranslationOptions::default(),
    )
    .unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn test_date_to_string() {
    let body = x().member("J").call("ToString", vec![Expr::string("%Y-%m-%d")]);
    assert_eq!(
        value(body),
        Bson::Document(doc! { "$dateToString": { "format": "%Y-%m-%d", "date": "$J" } })
    );
}

// ---- strings ----

#[test]
fn test_case_conversion_and_trim() {
    assert_eq!(
        value(x().member("A").call("ToLower", vec![])),
        Bson::Document(doc! { "$toLower": "$A" })
    );
    assert_eq!(
        value(x().member("A").call("ToUpperInvariant", vec![])),
        Bson::Document(doc! { "$toUpper": "$A" })
    );
    assert_eq!(
        value(x().member("A").call("Trim", vec![])),
        Bson::Document(doc! { "$trim": { "input": "$A" } })
    );
    assert_eq!(
        value(x().member("A").call("TrimEnd", vec![Expr::char('.')])),
        Bson::Document(doc! { "$rtrim": { "input": "$A", "chars": "." } })
    );
    assert_eq!(
        value(x().member("A").call("TrimStart", vec![])),
        Bson::Document(doc! { "$ltrim": { "input": "$A" } })
    );
}

#[test]
fn test_string_length_follows_translation_mode() {
    assert_eq!(
        value(x().member("A").member("Length")),
        Bson::Document(doc! { "$strLenBytes": "$A" })
    );
    let (stage, _) = project_with(x().member("A").member("Length"), code_points()).unwrap();
    assert_eq!(stage, doc! { "value": { "$strLenCP": "$A" }, "_id": 0 });
}

#[test]
fn test_substring() {
    assert_eq!(
        value(x().member("A").call("Substring", vec![Expr::int(1), Expr::int(2)])),
        Bson::Document(doc! { "$substr": ["$A", 1, 2] })
    );
    let (stage, _) = project_with(
        x().member("A").call("Substring", vec![Expr::int(1)]),
        code_points(),
    )
    .unwrap();
    assert_eq!(
        stage,
        doc! {
            "value": { "$substrCP": ["$A", 1, { "$subtract": [{ "$strLenCP": "$A" }, 1] }] },
            "_id": 0,
        }
    );
}

#[test]
fn test_index_of() {
    assert_eq!(
        value(x().member("A").call("IndexOf", vec![Expr::string("b")])),
        Bson::Document(doc! { "$indexOfBytes": ["$A", "b"] })
    );
    assert_eq!(
        value(x().member("A").call(
            "IndexOf",
            vec![Expr::string("b"), Expr::int(1), Expr::int(3)]
        )),
        Bson::Document(doc! { "$indexOfBytes": ["$A", "b", 1, { "$add": [1, 3] }] })
    );
}

#[test]
fn test_split() {
    assert_eq!(
        value(x().member("A").call("Split", vec![Expr::char(',')])),
        Bson::Document(doc! { "$split": ["$A", ","] })
    );
}

#[test]
fn test_string_equality_modes() {
    let ordinal = x()
        .member("A")
        .call("Equals", vec![Expr::string("abc"), Expr::string("Ordinal")]);
    assert_eq!(value(ordinal), Bson::Document(doc! { "$eq": ["$A", "abc"] }));

    let ignore_case = x()
        .member("A")
        .call("Equals", vec![Expr::string("abc"), Expr::string("OrdinalIgnoreCase")]);
    assert_eq!(
        value(ignore_case),
        Bson::Document(doc! { "$eq": [{ "$strcasecmp": ["$A", "abc"] }, 0] })
    );

    let culture = x()
        .member("A")
        .call("Equals", vec![Expr::string("abc"), Expr::string("CurrentCulture")]);
    assert!(project_with(culture, TranslationOptions::default())
        .unwrap_err()
        .is_unsupported());
}

#[test]
fn test_is_null_or_empty() {
    let body = Expr::static_call("String", "IsNullOrEmpty", vec![x().member("A")]);
    assert_eq!(
        value(body),
        Bson::Document(doc! { "$or": [{ "$eq": ["$A", null] }, { "$eq": ["$A", ""] }] })
    );
}

#[test]
fn test_compare_to() {
    let body = x().member("A").call("CompareTo", vec![x().member("B")]);
    assert_eq!(value(body), Bson::Document(doc! { "$cmp": ["$A", "$B"] }));
}

// ---- math ----

#[test]
fn test_math_functions() {
    assert_eq!(
        value(Expr::static_call("Math", "Abs", vec![x().member("P")])),
        Bson::Document(doc! { "$abs": "$P" })
    );
    assert_eq!(
        value(Expr::static_call("Math", "Sqrt", vec![x().member("Y")])),
        Bson::Document(doc! { "$sqrt": ["$Y"] })
    );
    assert_eq!(
        value(Expr::static_call("Math", "Log", vec![x().member("Y")])),
        Bson::Document(doc! { "$ln": ["$Y"] })
    );
    assert_eq!(
        value(Expr::static_call("Math", "Log", vec![x().member("Y"), Expr::int(2)])),
        Bson::Document(doc! { "$log": ["$Y", 2.0] })
    );
    assert_eq!(
        value(Expr::static_call("Math", "Pow", vec![x().member("Y"), Expr::int(2)])),
        Bson::Document(doc! { "$pow": ["$Y", 2] })
    );
}

// ---- arrays ----

#[test]
fn test_array_size_and_sum() {
    assert_eq!(
        value(x().member("L").call("Count", vec![])),
        Bson::Document(doc! { "$size": "$L" })
    );
    assert_eq!(
        value(x().member("L").member("Length")),
        Bson::Document(doc! { "$size": "$L" })
    );
    assert_eq!(
        value(x().member("L").call("Sum", vec![])),
        Bson::Document(doc! { "$sum": "$L" })
    );
    assert_eq!(
        value(x().member("L").call("StandardDeviationPopulation", vec![])),
        Bson::Document(doc! { "$stdDevPop": "$L" })
    );
    assert_eq!(
        value(x().member("L").call("StandardDeviationSample", vec![])),
        Bson::Document(doc! { "$stdDevSamp": "$L" })
    );
    assert_eq!(
        value(x().member("L").call("Concat", vec![x().member("M")])),
        Bson::Document(doc! { "$concatArrays": ["$L", "$M"] })
    );
}

#[test]
fn test_sum_with_selector_uses_array_path() {
    let c = param("c", "C");
    let body = x().member("G").call(
        "Sum",
        vec![Expr::lambda(
            vec![c.clone()],
            Expr::param(&c).member("E").member("F"),
        )],
    );
    assert_eq!(value(body), Bson::Document(doc! { "$sum": "$G.E.F" }));
}

#[test]
fn test_any_with_predicate_maps_elements() {
    let c = param("c", "C");
    let body = x().member("G").call(
        "Any",
        vec![Expr::lambda(
            vec![c.clone()],
            Expr::param(&c).member("E").member("F").gt(Expr::int(1)),
        )],
    );
    assert_eq!(
        value(body),
        Bson::Document(doc! {
            "$anyElementTrue": [{
                "$map": { "input": "$G", "as": "c", "in": { "$gt": ["$$c.E.F", 1] } }
            }]
        })
    );
}

#[test]
fn test_any_without_predicate() {
    assert_eq!(
        value(x().member("L").call("Any", vec![])),
        Bson::Document(doc! { "$gt": [{ "$size": "$L" }, 0] })
    );
}

#[test]
fn test_where_and_select() {
    let n = int("n");
    let filtered = x().member("L").call(
        "Where",
        vec![Expr::lambda(vec![n.clone()], Expr::param(&n).gt(Expr::int(2)))],
    );
    assert_eq!(
        value(filtered),
        Bson::Document(doc! {
            "$filter": { "input": "$L", "as": "n", "cond": { "$gt": ["$$n", 2] } }
        })
    );

    let doubled = x().member("L").call(
        "Select",
        vec![Expr::lambda(vec![n.clone()], Expr::param(&n).multiply(Expr::int(2)))],
    );
    assert_eq!(
        value(doubled),
        Bson::Document(doc! {
            "$map": { "input": "$L", "as": "n", "in": { "$multiply": ["$$n", 2] } }
        })
    );
}

#[test]
fn test_slices() {
    assert_eq!(
        value(x().member("L").call("Take", vec![Expr::int(2)])),
        Bson::Document(doc! { "$slice": ["$L", 2] })
    );
    assert_eq!(
        value(x().member("L").call("Skip", vec![Expr::int(1)])),
        Bson::Document(doc! { "$slice": ["$L", 1, i32::MAX] })
    );
    assert_eq!(
        value(
            x().member("L")
                .call("Skip", vec![Expr::int(1)])
                .call("Take", vec![Expr::int(2)])
        ),
        Bson::Document(doc! { "$slice": ["$L", 1, 2] })
    );
}

#[test]
fn test_array_contains_field() {
    let body = x().member("L").call("Contains", vec![x().member("P")]);
    assert_eq!(
        value(body),
        Bson::Document(doc! {
            "$anyElementTrue": [{
                "$map": { "input": "$L", "as": "item", "in": { "$eq": ["$$item", "$P"] } }
            }]
        })
    );
}

#[test]
fn test_local_collection_contains_field() {
    let local = Expr::local_array(vec![Bson::Int32(1), Bson::Int32(2)], ValueType::Int32);
    let body = local.call("Contains", vec![x().member("P")]);
    assert_eq!(
        value(body),
        Bson::Document(doc! { "$in": ["$P", { "$literal": [1, 2] }] })
    );
}

#[test]
fn test_inline_array_contains_field() {
    let inline = Expr::new_collection(
        crate::expr::CollectionKind::Array,
        None,
        vec![Expr::string("$A"), Expr::string("b")],
    );
    let body = inline.call("Contains", vec![x().member("A")]);
    assert_eq!(
        value(body),
        Bson::Document(doc! { "$in": ["$A", { "$literal": ["$A", "b"] }] })
    );
}

#[test]
fn test_lambda_over_inline_array_is_not_a_scope_violation() {
    let inline = Expr::new_collection(
        crate::expr::CollectionKind::Array,
        None,
        vec![Expr::int(1), Expr::int(2)],
    );
    let i = Param::new("i", ValueType::Int32);
    let body = inline.call(
        "Any",
        vec![Expr::lambda(vec![i.clone()], x().member("P").eq(Expr::param(&i)))],
    );
    let err = project_with(body, TranslationOptions::default()).unwrap_err();
    assert!(!err.is_scope_violation());
    assert!(err.is_unsupported());
}

#[test]
fn test_set_operators() {
    assert_eq!(
        value(x().member("L").call("Union", vec![x().member("M")])),
        Bson::Document(doc! { "$setUnion": ["$L", "$M"] })
    );
    assert_eq!(
        value(x().member("L").call("IsSupersetOf", vec![x().member("M")])),
        Bson::Document(doc! { "$setIsSubset": ["$M", "$L"] })
    );
    assert_eq!(
        value(x().member("L").call("Distinct", vec![])),
        Bson::Document(doc! { "$setUnion": ["$L"] })
    );
}

#[test]
fn test_element_members() {
    assert_eq!(
        value(x().member("G").call("First", vec![]).member("D")),
        Bson::Document(doc! { "$arrayElemAt": ["$G.D", 0] })
    );
    assert_eq!(
        value(x().member("G").call("ElementAt", vec![Expr::int(1)]).member("D")),
        Bson::Document(doc! {
            "$let": { "vars": { "item": { "$arrayElemAt": ["$G", 1] } }, "in": "$$item.D" }
        })
    );
}

#[test]
fn test_zip() {
    let (a, b) = (int("a"), int("b"));
    let body = x().member("L").call(
        "Zip",
        vec![
            x().member("M"),
            Expr::lambda(vec![a.clone(), b.clone()], Expr::param(&a).add(Expr::param(&b))),
        ],
    );
    assert_eq!(
        value(body),
        Bson::Document(doc! {
            "$map": {
                "input": { "$zip": { "inputs": ["$L", "$M"] } },
                "as": "a_b",
                "in": { "$add": [
                    { "$arrayElemAt": ["$$a_b", 0] },
                    { "$arrayElemAt": ["$$a_b", 1] }
                ] },
            }
        })
    );
}

#[test]
fn test_aggregate_reduces() {
    let (acc, n) = (int("acc"), int("n"));
    let body = x().member("L").call(
        "Aggregate",
        vec![
            Expr::int(0),
            Expr::lambda(vec![acc.clone(), n.clone()], Expr::param(&acc).add(Expr::param(&n))),
        ],
    );
    assert_eq!(
        value(body),
        Bson::Document(doc! {
            "$reduce": { "input": "$L", "initialValue": 0, "in": { "$add": ["$$value", "$$this"] } }
        })
    );
}

#[test]
fn test_range() {
    let body = Expr::static_call("Enumerable", "Range", vec![Expr::int(1), x().member("P")]);
    assert_eq!(
        value(body),
        Bson::Document(doc! { "$range": [1, { "$add": [1, "$P"] }] })
    );
}

#[test]
fn test_of_type_filters_by_discriminator() {
    let body = x().member("Children").of_type("OtherChild");
    assert_eq!(
        value(body),
        Bson::Document(doc! {
            "$filter": { "input": "$Children", "as": "item", "cond": { "$eq": ["$$item._t", "Other"] } }
        })
    );
}

// ---- scope ----

#[test]
fn test_outer_parameter_in_nested_lambda_is_rejected() {
    let c = param("c", "C");
    let body = x().member("G").call(
        "Where",
        vec![Expr::lambda(
            vec![c.clone()],
            Expr::param(&c).member("D").eq(x().member("A")),
        )],
    );
    let err = project_with(body, TranslationOptions::default()).unwrap_err();
    assert!(err.is_scope_violation());
    assert_eq!(err.parameter(), Some(root().name.as_str()));
}

#[test]
fn test_unknown_method_is_unsupported() {
    let err = project_with(x().member("A").call("Foo", vec![]), TranslationOptions::default())
        .unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(err.to_string(), "Unsupported expression: x.A.Foo()");
}

// ---- groups ----

#[test]
fn test_group_by_key_with_count() {
    let selector = Expr::new_object(
        None,
        vec![("Id", g().member("Key")), ("Count", g().call("Count", vec![]))],
    );
    let (stage, deserializer) = group(x().member("A"), selector).unwrap();
    assert_eq!(stage, doc! { "_id": "$A", "Count": { "$sum": 1 } });

    let row = deserializer.reshape(&doc! { "_id": "a", "Count": 3 }).unwrap();
    assert_eq!(row, Bson::Document(doc! { "Id": "a", "Count": 3 }));
}

#[test]
fn test_group_by_composite_key() {
    let key = Expr::new_object(None, vec![("A", x().member("A")), ("P", x().member("P"))]);
    let selector = Expr::new_object(
        None,
        vec![
            ("A", g().member("Key").member("A")),
            (
                "Total",
                g().call(
                    "Sum",
                    vec![Expr::lambda(vec![r()], Expr::param(&r()).member("P"))],
                ),
            ),
        ],
    );
    let (stage, deserializer) = group(key, selector).unwrap();
    assert_eq!(
        stage,
        doc! { "_id": { "A": "$A", "P": "$P" }, "Total": { "$sum": "$P" } }
    );
    let row = deserializer
        .reshape(&doc! { "_id": { "A": "a", "P": 1 }, "Total": 5 })
        .unwrap();
    assert_eq!(row, Bson::Document(doc! { "A": "a", "Total": 5 }));
}

#[test]
fn test_group_accumulators() {
    let select_p = g().call(
        "Select",
        vec![Expr::lambda(vec![r()], Expr::param(&r()).member("P"))],
    );
    let selector = Expr::new_object(
        None,
        vec![
            ("Max", select_p.clone().call("Max", vec![])),
            (
                "Avg",
                g().call(
                    "Average",
                    vec![Expr::lambda(vec![r()], Expr::param(&r()).member("Y"))],
                ),
            ),
            ("FirstA", g().call("First", vec![]).member("A")),
            ("Ps", select_p.clone().call("Distinct", vec![])),
            (
                "Flagged",
                g().call(
                    "Count",
                    vec![Expr::lambda(vec![r()], Expr::param(&r()).member("K"))],
                ),
            ),
            ("All", g().call("ToList", vec![])),
            (
                "SpreadY",
                g().call(
                    "StandardDeviationPopulation",
                    vec![Expr::lambda(vec![r()], Expr::param(&r()).member("Y"))],
                ),
            ),
            ("SpreadP", select_p.clone().call("StandardDeviationSample", vec![])),
        ],
    );
    let (stage, _) = group(x().member("A"), selector).unwrap();
    assert_eq!(
        stage,
        doc! {
            "_id": "$A",
            "Max": { "$max": "$P" },
            "Avg": { "$avg": "$Y" },
            "FirstA": { "$first": "$A" },
            "Ps": { "$addToSet": "$P" },
            "Flagged": { "$sum": { "$cond": ["$K", 1, 0] } },
            "All": { "$push": "$$ROOT" },
            "SpreadY": { "$stdDevPop": "$Y" },
            "SpreadP": { "$stdDevSamp": "$P" },
        }
    );
}

#[test]
fn test_group_scalar_selector() {
    let (stage, deserializer) = group(x().member("A"), g().call("Count", vec![])).unwrap();
    assert_eq!(stage, doc! { "_id": "$A", "value": { "$sum": 1 } });
    assert_eq!(deserializer.shape(), &ResultShape::computed("value"));
}

#[test]
fn test_group_last_with_predicate_is_unsupported() {
    let selector = Expr::new_object(
        None,
        vec![(
            "L",
            g().call(
                "Last",
                vec![Expr::lambda(vec![r()], Expr::param(&r()).member("K"))],
            ),
        )],
    );
    assert!(group(x().member("A"), selector).unwrap_err().is_unsupported());
}

#[test]
fn test_group_key_inside_element_lambda_is_rejected() {
    let selector = Expr::new_object(
        None,
        vec![(
            "N",
            g().call(
                "Count",
                vec![Expr::lambda(
                    vec![r()],
                    Expr::param(&r()).member("A").eq(g().member("Key")),
                )],
            ),
        )],
    );
    let err = group(x().member("A"), selector).unwrap_err();
    assert!(err.is_scope_violation());
    assert_eq!(err.parameter(), Some("g"));
}

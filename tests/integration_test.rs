/*!
End-to-end tests through the public API: script documents compile into
plans, plans apply to JSON documents, and the per-script containment and
success rules hold across files and runs.
*/

use mapscript::{
    apply_to_document, compile_directory, compile_scripts, Executor, NoDelegates, ScriptFile,
    TypeIndex, Value,
};
use pretty_assertions::assert_eq;

const MODEL: &str = r#"
types:
  - name: Order
    fields:
      - { name: customer, type: Customer }
      - { name: placedOn, type: String }
      - { name: codes, type: String, cardinality: list }
      - { name: names, type: String, cardinality: list }
      - { name: cells, type: Cell, cardinality: list }
  - name: Customer
    fields:
      - { name: fullName, type: String }
  - name: Cell
    fields:
      - { name: value, type: String }
  - name: OrderView
    fields:
      - { name: name, type: String }
      - { name: placed, type: Date }
      - { name: tags, type: String, cardinality: list }
      - { name: labels, type: String, cardinality: map }
      - { name: rows, type: Row, cardinality: list }
  - name: Row
    fields:
      - { name: name, type: String }
      - { name: cells, type: CellView, cardinality: list }
  - name: CellView
    fields:
      - { name: value, type: String }
"#;

fn index() -> TypeIndex {
    TypeIndex::from_yaml(MODEL).unwrap()
}

fn scripts(yaml: &str) -> ScriptFile {
    ScriptFile::from_yaml(yaml).unwrap()
}

fn apply(scripts_yaml: &str, source_json: &str) -> mapscript::RunOutcome {
    let index = index();
    let compiled = compile_scripts(&index, &scripts(scripts_yaml));
    assert!(
        compiled.report.aborted.is_none(),
        "unexpected abort: {:?}",
        compiled.report.aborted
    );
    let source = Value::from(serde_json::from_str::<serde_json::Value>(source_json).unwrap());
    Executor::new(&index, &compiled.arena, &NoDelegates).run(&compiled.plan, &source)
}

#[test]
fn flat_copy_is_loop_free() {
    let index = index();
    let file = scripts(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: copy-name
    target: { path: "name" }
    source: { path: "customer.fullName" }
"#,
    );
    let compiled = compile_scripts(&index, &file);
    let unit = compiled.plan.unit("copy-name").unwrap();
    assert_eq!(unit.loop_count(), 0);
    assert!(!unit.uses_offset);

    let source = Value::from(serde_json::json!({"customer": {"fullName": "Ada"}}));
    let out = Executor::new(&index, &compiled.arena, &NoDelegates).run(&compiled.plan, &source);
    assert!(out.units[0].1.is_completed());
    assert_eq!(
        out.target.as_object().unwrap().field("name"),
        &Value::Str("Ada".into())
    );
}

#[test]
fn equal_depths_pair_without_the_offset() {
    let index = index();
    let file = scripts(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: copy-tags
    target: { path: "tags[]" }
    source: { path: "codes[]" }
"#,
    );
    let compiled = compile_scripts(&index, &file);
    let unit = compiled.plan.unit("copy-tags").unwrap();
    assert_eq!(unit.loop_count(), 1);
    assert!(!unit.uses_offset);

    let out = apply(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: copy-tags
    target: { path: "tags[]" }
    source: { path: "codes[]" }
"#,
        r#"{"codes": ["a", "b", "c"]}"#,
    );
    assert_eq!(
        out.target.as_object().unwrap().field("tags"),
        &Value::List(vec![
            Value::Str("a".into()),
            Value::Str("b".into()),
            Value::Str("c".into()),
        ])
    );
}

#[test]
fn deeper_anchored_target_consumes_the_offset() {
    let index = index();
    let file = scripts(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: fill-row
    target: { path: "rows[~].cells[].value" }
    source: { path: "cells[].value" }
"#,
    );
    let compiled = compile_scripts(&index, &file);
    let unit = compiled.plan.unit("fill-row").unwrap();
    assert!(unit.uses_offset);
    // only the source's iterated level loops; the anchored level rides the
    // shared counter
    assert_eq!(unit.loop_count(), 1);

    let source = Value::from(serde_json::json!({"cells": [{"value": "x"}, {"value": "y"}]}));
    let out = Executor::new(&index, &compiled.arena, &NoDelegates).run(&compiled.plan, &source);
    let rows = out
        .target
        .as_object()
        .unwrap()
        .field("rows")
        .as_list()
        .unwrap();
    assert_eq!(rows.len(), 1);
    let cells = rows[0].as_object().unwrap().field("cells").as_list().unwrap();
    assert_eq!(
        cells[1].as_object().unwrap().field("value"),
        &Value::Str("y".into())
    );
}

#[test]
fn anchored_scripts_of_one_file_stack_into_the_collection() {
    let out = apply(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: row-cells
    target: { path: "rows[~].cells[].value" }
    source: { path: "cells[].value" }
  - id: row-name
    target: { path: "rows[~].name" }
    source: { path: "customer.fullName" }
"#,
        r#"{"customer": {"fullName": "Ada"}, "cells": [{"value": "x"}]}"#,
    );
    assert!(out.units.iter().all(|(_, o)| o.is_completed()));
    let rows = out
        .target
        .as_object()
        .unwrap()
        .field("rows")
        .as_list()
        .unwrap();
    // the first script completed one pass and advanced the counter, so the
    // second landed on the next element
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[1].as_object().unwrap().field("name"),
        &Value::Str("Ada".into())
    );
}

#[test]
fn seeded_anchor_starts_at_its_declared_index() {
    let out = apply(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: third-row
    target: { path: "rows[~2].name" }
    source: { path: "customer.fullName" }
"#,
        r#"{"customer": {"fullName": "Ada"}}"#,
    );
    assert!(out.units[0].1.is_completed());
    let rows = out
        .target
        .as_object()
        .unwrap()
        .field("rows")
        .as_list()
        .unwrap();
    // the seed lifts the shared counter, leaving the skipped slots null
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], Value::Null);
    assert_eq!(rows[1], Value::Null);
    assert_eq!(
        rows[2].as_object().unwrap().field("name"),
        &Value::Str("Ada".into())
    );
}

#[test]
fn post_anchor_seed_preserves_the_leading_entries() {
    let out = apply(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: head
    target: { path: "rows[0].name" }
    source: { path: "customer.fullName" }
  - id: appended
    target: { path: "rows[1~].name" }
    source: { path: "customer.fullName" }
  - id: next
    target: { path: "rows[~].name" }
    source: { path: "placedOn" }
"#,
        r#"{"customer": {"fullName": "Ada"}, "placedOn": "west"}"#,
    );
    assert!(out.units.iter().all(|(_, o)| o.is_completed()));
    let rows = out
        .target
        .as_object()
        .unwrap()
        .field("rows")
        .as_list()
        .unwrap();
    // the pinned slot survives the seed, and the counter keeps advancing
    // from there instead of resetting for the later script
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[0].as_object().unwrap().field("name"),
        &Value::Str("Ada".into())
    );
    assert_eq!(
        rows[1].as_object().unwrap().field("name"),
        &Value::Str("Ada".into())
    );
    assert_eq!(
        rows[2].as_object().unwrap().field("name"),
        &Value::Str("west".into())
    );
}

#[test]
fn second_anchor_in_a_chain_emits_nothing() {
    let index = index();
    let file = scripts(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: twice
    target: { path: "rows[~].cells[~].value" }
    source: { path: "cells[].value" }
"#,
    );
    let compiled = compile_scripts(&index, &file);
    assert_eq!(compiled.report.failed_count(), 1);
    assert!(compiled.plan.unit("twice").is_none());
    assert!(compiled.plan.units.is_empty());
}

#[test]
fn anchor_on_a_source_chain_is_rejected() {
    let index = index();
    let file = scripts(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: src-anchor
    target: { path: "tags[]" }
    source: { path: "codes[~]" }
"#,
    );
    let compiled = compile_scripts(&index, &file);
    assert_eq!(compiled.report.failed_count(), 1);
    assert!(compiled.plan.units.is_empty());
}

#[test]
fn pinned_index_writes_exactly_that_slot() {
    let out = apply(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: third-tag
    target: { path: "tags[2]" }
    source: { path: "customer.fullName" }
"#,
        r#"{"customer": {"fullName": "Ada"}}"#,
    );
    let tags = out
        .target
        .as_object()
        .unwrap()
        .field("tags")
        .as_list()
        .unwrap();
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[0], Value::Null);
    assert_eq!(tags[2], Value::Str("Ada".into()));
}

#[test]
fn literal_values_unroll_in_declaration_order() {
    let out = apply(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: seed-tags
    target: { path: "tags[]" }
    values: ["new", "priority", "manual"]
"#,
        r#"{}"#,
    );
    assert!(out.units[0].1.is_completed());
    assert_eq!(
        out.target.as_object().unwrap().field("tags"),
        &Value::List(vec![
            Value::Str("new".into()),
            Value::Str("priority".into()),
            Value::Str("manual".into()),
        ])
    );
}

#[test]
fn empty_value_list_is_skipped_not_failed() {
    let index = index();
    let file = scripts(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: nothing
    target: { path: "tags[]" }
    values: []
  - id: copy-name
    target: { path: "name" }
    source: { path: "customer.fullName" }
"#,
    );
    let compiled = compile_scripts(&index, &file);
    assert_eq!(compiled.report.skipped_count(), 1);
    assert_eq!(compiled.report.generated_count(), 1);
    assert!(compiled.report.is_success());
}

#[test]
fn mistyped_literal_fails_its_script_only() {
    let index = index();
    let file = scripts(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: bad-literal
    target: { path: "tags[]" }
    values: [5]
  - id: copy-name
    target: { path: "name" }
    source: { path: "customer.fullName" }
"#,
    );
    let compiled = compile_scripts(&index, &file);
    assert_eq!(compiled.report.failed_count(), 1);
    assert_eq!(compiled.report.generated_count(), 1);
    assert!(compiled.plan.unit("bad-literal").is_none());
    assert!(compiled.plan.unit("copy-name").is_some());
}

#[test]
fn string_leaf_parses_into_a_date_leaf() {
    let out = apply(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: placed
    target: { path: "placed" }
    source: { path: "placedOn" }
"#,
        r#"{"placedOn": "2024-03-01"}"#,
    );
    assert!(out.units[0].1.is_completed());
    assert_eq!(
        out.target.as_object().unwrap().field("placed"),
        &Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    );
}

#[test]
fn unparsable_date_fails_the_unit_at_runtime() {
    let out = apply(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: placed
    target: { path: "placed" }
    source: { path: "placedOn" }
"#,
        r#"{"placedOn": "03/01/2024"}"#,
    );
    assert!(matches!(
        out.units[0].1,
        mapscript::UnitOutcome::Failed { .. }
    ));
}

#[test]
fn map_slots_pair_by_shared_ordinal() {
    let out = apply(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: keys
    target: { path: "labels<K>" }
    source: { path: "codes[]" }
  - id: values
    target: { path: "labels<V>" }
    source: { path: "names[]" }
"#,
        r#"{"codes": ["a", "b"], "names": ["Alpha", "Beta"]}"#,
    );
    assert!(out.units.iter().all(|(_, o)| o.is_completed()));
    let labels = out
        .target
        .as_object()
        .unwrap()
        .field("labels")
        .as_map()
        .unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[0].0, Value::Str("a".into()));
    assert_eq!(labels[0].1, Value::Str("Alpha".into()));
    assert_eq!(labels[1].0, Value::Str("b".into()));
    assert_eq!(labels[1].1, Value::Str("Beta".into()));
}

#[test]
fn both_nested_delegate_is_rejected() {
    let index = index();
    let file = scripts(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: nested-both
    target: { path: "rows[].cells[]" }
    execute:
      module: cellMapper
      source: { path: "cells[]" }
"#,
    );
    let compiled = compile_scripts(&index, &file);
    assert_eq!(compiled.report.failed_count(), 1);
    assert!(compiled.plan.units.is_empty());
}

#[test]
fn duplicate_and_disabled_records_are_contained() {
    let index = index();
    let file = scripts(
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: copy-name
    target: { path: "name" }
    source: { path: "customer.fullName" }
  - id: copy-name
    target: { path: "name" }
    source: { path: "customer.fullName" }
  - id: off
    enabled: false
    target: { path: "name" }
    source: { path: "customer.fullName" }
"#,
    );
    let compiled = compile_scripts(&index, &file);
    assert_eq!(compiled.report.generated_count(), 1);
    assert_eq!(compiled.report.failed_count(), 1);
    assert_eq!(compiled.report.skipped_count(), 1);
    assert_eq!(compiled.plan.units.len(), 1);
}

#[test]
fn run_succeeds_when_any_file_does() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("good.yaml"),
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: copy-name
    target: { path: "name" }
    source: { path: "customer.fullName" }
"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("bad.yaml"),
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: broken
    target: { path: "nickname" }
    source: { path: "customer.fullName" }
"#,
    )
    .unwrap();

    let index = index();
    let (run, files) = compile_directory(&index, dir.path()).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(run.success_count(), 1);
    assert!(run.is_success());
}

#[test]
fn apply_to_document_runs_a_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let script_path = dir.path().join("orders.yaml");
    std::fs::write(
        &script_path,
        r#"
target_root: OrderView
source_root: Order
scripts:
  - id: copy-name
    target: { path: "name" }
    source: { path: "customer.fullName" }
  - id: copy-tags
    target: { path: "tags[]" }
    source: { path: "codes[]" }
"#,
    )
    .unwrap();

    let index = index();
    let out = apply_to_document(
        &index,
        &script_path,
        serde_json::json!({"customer": {"fullName": "Ada"}, "codes": ["a"]}),
    )
    .unwrap();
    assert!(out.units.iter().all(|(_, o)| o.is_completed()));
    let target = out.target.as_object().unwrap();
    assert_eq!(target.field("name"), &Value::Str("Ada".into()));
    assert_eq!(
        target.field("tags"),
        &Value::List(vec![Value::Str("a".into())])
    );
}

//! Graph queries over dumps read from disk

use std::fs::File;
use std::io::BufReader;

use super::common::dump_fixtures::{object, params, TestDump, A, B, C, D, DATA, ORPHAN};
use heapsift::{
    write_svg, Graph, HeapError, Link, NoSymbols, RecordReader, RootKind, SvgOptions, SymbolTable,
};

fn load(dump: &TestDump) -> Graph {
    load_with(dump, &NoSymbols)
}

fn load_with(dump: &TestDump, resolver: &dyn heapsift::SymbolResolver) -> Graph {
    let file = File::open(&dump.path).expect("Failed to open dump");
    let reader = RecordReader::new(BufReader::new(file)).expect("Failed to read header");
    Graph::build(reader, resolver).expect("Failed to build graph")
}

#[test]
fn test_anchor_chain_through_global() {
    let graph = load(&TestDump::chain());

    let anchors = graph.anchors(C).unwrap();
    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0].root.kind, RootKind::Global);
    assert_eq!(anchors[0].root.label, "data");
    assert_eq!(
        anchors[0].chain,
        vec![
            Link { from: A, to: B, offset: 0 },
            Link { from: B, to: C, offset: 0 },
        ]
    );

    let direct = graph.anchors(A).unwrap();
    assert_eq!(direct.len(), 1);
    assert!(direct[0].chain.is_empty());
}

#[test]
fn test_global_roots_are_named_by_symbols() {
    let mut symbols = SymbolTable::new();
    symbols.insert(DATA, "main.registry", Some(8));
    let graph = load_with(&TestDump::chain(), &symbols);
    let anchors = graph.anchors(B).unwrap();
    assert_eq!(anchors[0].root.label, "main.registry");
}

#[test]
fn test_stack_roots_name_goroutine_and_function() {
    let graph = load(&TestDump::chain());
    let anchors = graph.anchors(D).unwrap();
    assert_eq!(anchors.len(), 1);
    assert_eq!(anchors[0].root.kind, RootKind::StackFrame);
    assert_eq!(anchors[0].root.label, "goroutine 1 main.main");
}

#[test]
fn test_orphan_has_no_anchors() {
    let graph = load(&TestDump::chain());
    assert!(graph.anchors(ORPHAN).unwrap().is_empty());
    assert!(graph.owners(ORPHAN, 4).unwrap().is_empty());
}

#[test]
fn test_owners_levels() {
    let graph = load(&TestDump::chain());

    let direct = graph.owners(C, 0).unwrap();
    assert_eq!(direct.levels.len(), 1);
    assert_eq!(direct.levels[0][0].from, B);

    let two = graph.owners(C, 1).unwrap();
    assert_eq!(two.levels.len(), 2);
    assert_eq!(two.levels[1][0].from, A);
}

#[test]
fn test_finalizer_types_objects() {
    let graph = load(&TestDump::chain());
    let leaf = graph.object(C).unwrap();
    assert_eq!(leaf.type_id, Some(0x4c0000));
    assert_eq!(graph.type_name(0x4c0000), Some("main.node"));
}

#[test]
fn test_hexdump_covers_object() {
    let graph = load(&TestDump::chain());
    let dump = graph.hexdump(C).unwrap();
    assert_eq!(
        dump,
        "00000000  6c 65 61 66 2d 6f 62 6a                           |leaf-obj|\n"
    );
    assert!(matches!(
        graph.hexdump(0x10),
        Err(HeapError::UnknownAddress(0x10))
    ));
}

#[test]
fn test_intersection_ignores_addresses() {
    let ours = load(&TestDump::chain());
    let theirs = load(&TestDump::relocated(0x100000));

    let forward = ours.intersection(&theirs);
    assert_eq!(forward.len(), ours.len());
    let backward = theirs.intersection(&ours);
    assert_eq!(backward.len(), theirs.len());
    assert_eq!(backward.records()[0].address, A + 0x100000);
    assert_eq!(forward.params().heap_start, ours.params().heap_start);
}

#[test]
fn test_intersection_with_changed_contents() {
    let ours = load(&TestDump::chain());
    let changed = TestDump::from_records(&[
        params(),
        object(0xc000900000, &[0xc000910000], b"node-a.."),
        object(0xc000910000, &[], b"changed!"),
    ]);
    let theirs = load(&changed);

    let common: Vec<_> = ours
        .intersection(&theirs)
        .records()
        .iter()
        .map(|o| o.address)
        .collect();
    assert_eq!(common, vec![A]);
}

#[test]
fn test_svg_of_cycle_renders_each_object_once() {
    let dump = TestDump::cycle();
    let graph = load(&dump);
    let out_path = dump.sibling("cycle.svg");
    let file = File::create(&out_path).unwrap();

    let report = write_svg(&graph, &NoSymbols, A, &SvgOptions::default(), file).unwrap();
    assert_eq!(report.rendered, 2);
    assert_eq!(report.omitted, 0);

    let svg = std::fs::read_to_string(&out_path).unwrap();
    assert!(svg.starts_with("<svg"));
    assert_eq!(svg.matches(&format!("{A:#x} (")).count(), 1);
    assert_eq!(svg.matches(&format!("{B:#x} (")).count(), 1);
}

#[test]
fn test_truncated_file_is_malformed() {
    let dump = TestDump::chain();
    let bytes = std::fs::read(&dump.path).unwrap();
    let cut = TestDump::from_records(&[]);
    // Drop the EOF tag and the end of the last record.
    std::fs::write(&cut.path, &bytes[..bytes.len() - 3]).unwrap();

    let file = File::open(&cut.path).unwrap();
    let reader = RecordReader::new(BufReader::new(file)).unwrap();
    let err = Graph::build(reader, &NoSymbols).unwrap_err();
    assert!(matches!(err, HeapError::MalformedFormat { .. }));
}

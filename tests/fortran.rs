//! End-to-end exercise of the bundled Fortran grammar: compile the
//! schema, build a small program tree, walk it, print it, and check the
//! round trip.

use zasdl::{
    print::{Printer, check_round_trip},
    schema,
    span::Span,
    token::tokenize,
    tree::{Item, Tree, TreeBuilder, Value},
    trivia::TriviaBuilder,
    validate::{Grammar, validate},
    visit::{Rebuilder, walk},
};

fn fortran() -> Grammar {
    let src = include_str!("../schemas/fortran.asdl");
    let module = schema::parse(&tokenize(src)).expect("fortran schema should parse");
    let mut grammar = validate(module).expect("fortran schema should validate");
    grammar.enable_trivia("stmt").unwrap();
    grammar
}

#[test]
fn schema_compiles_with_stable_discriminants() {
    let grammar = fortran();
    assert_eq!(grammar.name(), "Fortran");
    assert!(grammar.num_types() >= 25);
    assert!(grammar.num_ctors() >= 130);

    // declaration order: unit's five constructors first, then stmt's
    let program = grammar.lookup_ctor("Program").unwrap();
    let assignment = grammar.lookup_ctor("Assignment").unwrap();
    assert_eq!(program.discriminant(), 0);
    assert_eq!(assignment.discriminant(), 5);

    // the shared label attribute lands after each constructor's own fields
    assert_eq!(grammar.field_index(assignment, "label"), Some(2));
    let cont = grammar.lookup_ctor("Continue").unwrap();
    assert_eq!(grammar.field_index(cont, "label"), Some(0));

    // products register an anonymous constructor under the type's name
    let entity = grammar.lookup_ctor("entity_decl").unwrap();
    assert_eq!(grammar.ctor(entity).fields.len(), 4);

    assert!(grammar.carries_trivia(assignment));
    assert!(!grammar.carries_trivia(grammar.lookup_ctor("Num").unwrap()));
}

/// program main
///   x = 1  ! init
///   if (x > 0) stop
/// end
fn sample(grammar: &Grammar) -> Tree<'_> {
    let mut b = TreeBuilder::new(grammar);

    let x = b.intern("x");
    let target = b.alloc_named("Name", vec![Value::ident(x)], Span::empty());
    let one = b.alloc_named("Num", vec![Value::int(1)], Span::empty());
    let assignment = b.alloc_named(
        "Assignment",
        vec![Value::node(target), Value::node(one), Value::opt_node(None)],
        Span::empty(),
    );

    let mut trivia = TriviaBuilder::new();
    trivia.comment("init").end_of_line();
    b.attach_trivia(assignment, trivia.finish().unwrap());

    let gt = b.alloc_named("Gt", vec![], Span::empty());
    let left = b.alloc_named("Name", vec![Value::ident(x)], Span::empty());
    let zero = b.alloc_named("Num", vec![Value::int(0)], Span::empty());
    let cond = b.alloc_named(
        "Compare",
        vec![Value::node(gt), Value::node(left), Value::node(zero)],
        Span::empty(),
    );
    let stop = b.alloc_named(
        "Stop",
        vec![Value::Opt(None), Value::Opt(None)],
        Span::empty(),
    );
    let stmt_if = b.alloc_named(
        "If",
        vec![
            Value::node(cond),
            Value::seq_nodes([stop]),
            Value::seq_nodes([]),
            Value::Opt(None),
        ],
        Span::empty(),
    );

    let main = b.intern("main");
    let root = b.alloc_named(
        "Program",
        vec![
            Value::ident(main),
            Value::seq_nodes([assignment, stmt_if]),
            Value::seq_nodes([]),
        ],
        Span::empty(),
    );
    b.freeze(root)
}

#[test]
fn walks_a_program_in_source_order() {
    let grammar = fortran();
    let tree = sample(&grammar);

    let mut order = Vec::new();
    walk(&tree, tree.root(), &mut |tree, node| {
        order.push(tree.ctor_name(node).to_owned());
    });
    assert_eq!(
        order,
        [
            "Program",
            "Assignment",
            "Name",
            "Num",
            "If",
            "Compare",
            "Gt",
            "Name",
            "Num",
            "Stop",
        ]
    );
}

#[test]
fn prints_and_round_trips_with_trivia() {
    let grammar = fortran();
    let tree = sample(&grammar);

    let text = Printer::new(&grammar).print(&tree);
    insta::assert_snapshot!(
        text,
        @r#"Program(main, [Assignment(Name(x), Num(1), ()) @[c "init", nl][], If(Compare(Gt(), Name(x), Num(0)), [Stop((), ())], [], ())], [])"#
    );

    check_round_trip(&tree).unwrap();
}

#[test]
fn statement_labels_ride_the_shared_attribute() {
    let grammar = fortran();
    let mut b = TreeBuilder::new(&grammar);
    let cont = b.alloc_named(
        "Continue",
        vec![Value::Opt(Some(Item::Int(10)))],
        Span::empty(),
    );
    let tree = b.freeze(cont);

    assert!(tree.is_present(tree.root(), 0));
    let text = Printer::new(&grammar).print(&tree);
    assert_eq!(text, "Continue(10)");
    check_round_trip(&tree).unwrap();
}

#[test]
fn identity_rebuild_preserves_a_fortran_tree() {
    let grammar = fortran();
    let tree = sample(&grammar);

    let rebuilder = Rebuilder::identity(&grammar).finish().unwrap();
    let copy = rebuilder.run(&tree);
    assert!(tree.structurally_eq(&copy));
    assert_eq!(copy.len(), tree.len());
}

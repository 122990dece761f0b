//! Property-based tests (proptest): determinism of the pipeline, literal
//! folding against reference arithmetic, and idempotence of the clean-up
//! passes on arbitrarily nested sequences.

use proptest::prelude::*;

use archetype_ir::model::builders::*;
use archetype_ir::model::{Mnode, Mterm, RatArithOp};
use archetype_ir::passes::{normalize, rational};
use archetype_ir::pipeline::{run, Options};
use archetype_ir::Model;

fn entry_model(body: Mterm) -> Model {
    let mut m = Model::new("prop");
    m.functions
        .push(FunctionBuilder::entry("go").body(body).build());
    m
}

/// Arbitrary integer expression tree of bounded depth
fn int_expr() -> impl Strategy<Value = Mterm> {
    let leaf = (-1000i128..1000).prop_map(mint);
    leaf.prop_recursive(3, 16, 2, |inner| {
        (inner.clone(), inner).prop_map(|(a, b)| {
            mplus(a, b, tint())
        })
    })
}

/// Arbitrary statement list nested in sequences
fn nested_seq() -> impl Strategy<Value = Mterm> {
    let stmt = (0u32..5).prop_map(|i| massign_var(format!("x{i}"), mint(i as i128)));
    stmt.prop_recursive(4, 24, 3, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(mseq)
    })
}

proptest! {
    #[test]
    fn pipeline_runs_are_byte_identical(body in nested_seq()) {
        let (a, _) = run(entry_model(body.clone()), &Options::default()).unwrap();
        let (b, _) = run(entry_model(body), &Options::default()).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn flat_sequence_reaches_a_fixpoint(body in nested_seq()) {
        let once = normalize::flat_sequence(entry_model(body));
        let twice = normalize::flat_sequence(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn integer_folding_matches_reference(a in -1000i128..1000, b in -1000i128..1000) {
        let body = massign_var(
            "x",
            mplus(mint(a), mint(b), tint()),
        );
        let out = rational::update_nat_int_rat(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        prop_assert_eq!(&value.node, &Mnode::Int(a + b));
    }

    #[test]
    fn rational_folding_matches_cross_multiplication(
        an in -50i128..50, ad in 1u128..50,
        bn in -50i128..50, bd in 1u128..50,
    ) {
        let sum = Mterm::synthesised(
            Mnode::RatArith(
                RatArithOp::Plus,
                Box::new(mrat_pair(an, ad)),
                Box::new(mrat_pair(bn, bd)),
            ),
            ttuple(vec![tint(), tnat()]),
        );
        let out = rational::update_nat_int_rat(entry_model(massign_var("x", sum)));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let expected = mrat_pair(an * bd as i128 + bn * ad as i128, ad * bd);
        prop_assert_eq!(&**value, &expected);

        // sanity: the folded value denotes the exact rational sum
        let Mnode::Tuple(items) = &value.node else { panic!() };
        let (Mnode::Int(n), Mnode::Nat(d)) = (&items[0].node, &items[1].node) else {
            panic!()
        };
        // n/d == an/ad + bn/bd  <=>  n * ad * bd == (an*bd + bn*ad) * d
        prop_assert_eq!(
            n * (ad * bd) as i128,
            (an * bd as i128 + bn * ad as i128) * *d as i128
        );
    }

    #[test]
    fn folded_int_trees_fully_reduce(e in int_expr()) {
        let out = rational::update_nat_int_rat(entry_model(massign_var("x", e)));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        prop_assert!(matches!(value.node, Mnode::Int(_)), "plus-trees of literals fold flat");
    }
}

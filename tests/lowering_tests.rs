//! Structural tests of the individual lowerings through the public pass
//! functions: rational pairs, epoch dates, the iterable-big-map triple and
//! the idempotent clean-up passes.

use archetype_ir::model::builders::*;
use archetype_ir::model::{
    Decl, ForBinder, Loc, MapKind, Mnode, Mterm, RatArithOp, StorageItem, StorageKind, Tnode,
};
use archetype_ir::passes::{containers, normalize, rational, whole_program};
use archetype_ir::Model;

fn entry_model(body: Mterm) -> Model {
    let mut m = Model::new("t");
    m.functions
        .push(FunctionBuilder::entry("go").body(body).build());
    m
}

// ============================================================================
// rationals
// ============================================================================

#[test]
fn rational_field_value_stores_as_int_nat_pair() {
    // r := 1/2  =>  r := (1, 2) typed (int, nat)
    let body = massign_var("r", mrational(1, 2));
    let out = rational::remove_rational(entry_model(body));
    let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
        panic!()
    };
    assert_eq!(value.type_, ttuple(vec![tint(), tnat()]));
    let Mnode::Tuple(items) = &value.node else { panic!() };
    assert_eq!(items[0].node, Mnode::Int(1));
    assert_eq!(items[1].node, Mnode::Nat(2));
}

#[test]
fn nested_rational_expression_becomes_ratarith_tree() {
    // r1 + (1/3) * r4
    let body = massign_var(
        "out",
        Mterm::synthesised(
            Mnode::Plus(
                Box::new(mvar_local("r1", trat())),
                Box::new(Mterm::synthesised(
                    Mnode::Mult(
                        Box::new(mrational(1, 3)),
                        Box::new(mvar_local("r4", trat())),
                    ),
                    trat(),
                )),
            ),
            trat(),
        ),
    );
    let out = rational::remove_rational(entry_model(body));
    let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
        panic!()
    };
    let Mnode::RatArith(RatArithOp::Plus, lhs, rhs) = &value.node else {
        panic!("expected plus at the root, got {:?}", value.node)
    };
    assert!(matches!(lhs.node, Mnode::Var { .. }));
    let Mnode::RatArith(RatArithOp::Mult, lit, var) = &rhs.node else {
        panic!("expected mult under plus")
    };
    assert_eq!(**lit, mrat_pair(1, 3));
    assert!(matches!(var.node, Mnode::Var { .. }));
}

#[test]
fn rational_fold_cross_multiplies() {
    let sum = Mterm::synthesised(
        Mnode::RatArith(
            RatArithOp::Minus,
            Box::new(mrat_pair(3, 4)),
            Box::new(mrat_pair(1, 4)),
        ),
        ttuple(vec![tint(), tnat()]),
    );
    let out = rational::update_nat_int_rat(entry_model(massign_var("x", sum)));
    let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
        panic!()
    };
    // (3*4 - 1*4, 4*4) - simplified but not reduced
    assert_eq!(**value, mrat_pair(8, 16));
}

// ============================================================================
// iterable big maps
// ============================================================================

#[test]
fn ibm_storage_slot_becomes_triple() {
    let mut m = Model::new("t");
    m.storage.push(StorageItem {
        id: "journal".into(),
        kind: StorageKind::Var,
        typ: titerable_big_map(tstring(), tnat()),
        default: Mterm::synthesised(
            Mnode::LitMap(Vec::new()),
            titerable_big_map(tstring(), tnat()),
        ),
        ghost: false,
        loc: Loc::NONE,
    });
    m.functions
        .push(FunctionBuilder::entry("noop").body(mskip()).build());
    let out = containers::remove_iterable_big_map(m);
    assert_eq!(
        out.storage[0].typ,
        ttuple(vec![
            tbig_map(tstring(), ttuple(vec![tnat(), tnat()])),
            tbig_map(tnat(), tstring()),
            tnat()
        ])
    );
}

#[test]
fn ibm_removal_swaps_the_last_entry_into_the_hole() {
    let m_ty = titerable_big_map(tstring(), tnat());
    let body = massign_storage(
        "m",
        Mterm::synthesised(
            Mnode::MapRemove(
                Box::new(mvar_storage("m", m_ty)),
                Box::new(mstring("b")),
            ),
            titerable_big_map(tstring(), tnat()),
        ),
    );
    let out = containers::remove_iterable_big_map(entry_model(body));
    let body = &out.functions[0].body;
    // guarded by membership of the value map
    let Mnode::If { cond, then_branch, .. } = &body.node else {
        panic!("expected membership guard, got {:?}", body.node)
    };
    assert!(matches!(cond.node, Mnode::MapContains(_, _)));
    // the swap path binds the key sitting at the last position
    let mut saw_last_key_read = false;
    archetype_ir::traversal::any_term(then_branch, &mut |t| {
        if let Mnode::Letin { id, .. } = &t.node {
            if id == "_ibm_lk" {
                saw_last_key_read = true;
            }
        }
        false
    });
    assert!(saw_last_key_read, "swap-remove must look up the last key");
}

#[test]
fn ibm_length_reads_the_counter() {
    let m_ty = titerable_big_map(tstring(), tnat());
    let body = massign_var(
        "n",
        Mterm::synthesised(
            Mnode::MapLength(Box::new(mvar_storage("m", m_ty))),
            tnat(),
        ),
    );
    let out = containers::remove_iterable_big_map(entry_model(body));
    let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
        panic!()
    };
    let Mnode::TupleAccess { index, arity, .. } = &value.node else {
        panic!("expected counter read, got {:?}", value.node)
    };
    assert_eq!((*index, *arity), (2, 3));
}

#[test]
fn ibm_iteration_is_insertion_ordered() {
    let m_ty = titerable_big_map(tstring(), tnat());
    let body = mfor(
        ForBinder::Single("k".into()),
        mvar_storage("m", m_ty),
        mskip(),
    );
    let out = containers::remove_iterable_big_map(entry_model(body));
    let Mnode::Iter { from, to, body, .. } = &out.functions[0].body.node else {
        panic!("expected indexed loop")
    };
    assert_eq!(from.node, Mnode::Nat(1));
    // upper bound is the size counter
    assert!(matches!(to.node, Mnode::TupleAccess { index: 2, .. }));
    // the key is read from the position index per step
    let Mnode::Letin { value, .. } = &body.node else { panic!() };
    assert!(matches!(value.node, Mnode::MapGet(_, _)));
}

// ============================================================================
// idempotent clean-ups
// ============================================================================

#[test]
fn flat_sequence_is_idempotent() {
    let body = mseq(vec![
        mseq(vec![massign_var("a", mint(1))]),
        mseq(vec![mseq(vec![massign_var("b", mint(2))])]),
    ]);
    let once = normalize::flat_sequence(entry_model(body));
    let twice = normalize::flat_sequence(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn sort_container_is_idempotent() {
    let mut m = Model::new("t");
    m.storage.push(StorageItem {
        id: "s".into(),
        kind: StorageKind::Var,
        typ: tset(tnat()),
        default: mlit_set(vec![mnat(2), mnat(1)], tnat()),
        ghost: false,
        loc: Loc::NONE,
    });
    let once = whole_program::sort_container(m);
    let twice = whole_program::sort_container(once.clone());
    assert_eq!(once, twice);
}

#[test]
fn eval_storage_is_idempotent() {
    let mut m = Model::new("t");
    m.storage.push(StorageItem {
        id: "a".into(),
        kind: StorageKind::Var,
        typ: tint(),
        default: mplus(mint(1), mint(2), tint()),
        ghost: false,
        loc: Loc::NONE,
    });
    let once = whole_program::eval_storage(m);
    assert_eq!(once.storage[0].default, mint(3));
    let twice = whole_program::eval_storage(once.clone());
    assert_eq!(once, twice);
}

// ============================================================================
// date lowering at the declaration level
// ============================================================================

#[test]
fn asset_date_fields_lower_to_timestamps() {
    let mut m = Model::new("t");
    m.decls.push(Decl::Asset(
        AssetDeclBuilder::new("mile")
            .key("id", tstring())
            .field("expiration", tdate())
            .map_kind(MapKind::Map)
            .build(),
    ));
    m.functions
        .push(FunctionBuilder::entry("noop").body(mskip()).build());
    let out = rational::replace_date_duration_by_timestamp(m);
    let a = out.get_asset("mile").unwrap();
    assert_eq!(a.field("expiration").unwrap().typ.node, Tnode::Timestamp);
}

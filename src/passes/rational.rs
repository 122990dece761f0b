//! # Numeric Lowerings
//!
//! Rational arithmetic to `(int, nat)` pairs with dedicated primitives,
//! dates and durations to their epoch representation, `nat` coercion of
//! currency multiplicands, and string concatenation.
//!
//! Literal folding (`update_nat_int_rat`) runs after both the rational and
//! the date lowering; ranges are simplified but deliberately not reduced to
//! lowest terms.
//!
//! ## Pipeline Position
//!
//! ```text
//! asset lowering -> [remove_rational -> update_nat_int_rat
//!                    -> replace_date_duration_by_timestamp -> update_nat_int_rat
//!                    -> abs_tez -> process_internal_string] -> ...
//! ```

use crate::model::builders::*;
use crate::model::{
    BuiltinFn, CmpKind, Mnode, Model, Mterm, RatArithOp, Tnode, Type,
};
use crate::traversal::{map_model_terms, map_model_types, rewrite_term};

fn is_rat(ty: &Type) -> bool {
    ty.node == Tnode::Rational || *ty == trat_pair()
}

/// Coerce a numeric operand into the rational pair
fn to_rat(t: Mterm) -> Mterm {
    match &t.type_.node {
        Tnode::Rational => t,
        Tnode::Tuple(_) => t,
        Tnode::Int => Mterm::synthesised(
            Mnode::Builtin(BuiltinFn::IntToRat, vec![t]),
            trat_pair(),
        ),
        Tnode::Nat => Mterm::synthesised(
            Mnode::Builtin(BuiltinFn::NatToRat, vec![t]),
            trat_pair(),
        ),
        _ => t,
    }
}

// ============================================================================
// remove_rational
// ============================================================================

/// Rewrite `rational` arithmetic and comparisons to `(int, nat)` pairs and
/// the dedicated primitives.
pub fn remove_rational(model: Model) -> Model {
    let model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let loc = s.loc;
            match s.node {
                Mnode::Rational(n, d) => mrat_pair(n, d).with_loc(loc),
                Mnode::Equal(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => Mterm::new(
                    Mnode::RatEq(Box::new(to_rat(*a)), Box::new(to_rat(*b))),
                    tbool(),
                    loc,
                ),
                Mnode::Nequal(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => mnot(Mterm::new(
                    Mnode::RatEq(Box::new(to_rat(*a)), Box::new(to_rat(*b))),
                    tbool(),
                    loc,
                )),
                Mnode::Lt(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => Mterm::new(
                    Mnode::RatCmp(CmpKind::Lt, Box::new(to_rat(*a)), Box::new(to_rat(*b))),
                    tbool(),
                    loc,
                ),
                Mnode::Le(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => Mterm::new(
                    Mnode::RatCmp(CmpKind::Le, Box::new(to_rat(*a)), Box::new(to_rat(*b))),
                    tbool(),
                    loc,
                ),
                Mnode::Gt(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => Mterm::new(
                    Mnode::RatCmp(CmpKind::Gt, Box::new(to_rat(*a)), Box::new(to_rat(*b))),
                    tbool(),
                    loc,
                ),
                Mnode::Ge(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => Mterm::new(
                    Mnode::RatCmp(CmpKind::Ge, Box::new(to_rat(*a)), Box::new(to_rat(*b))),
                    tbool(),
                    loc,
                ),
                Mnode::Plus(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => Mterm::new(
                    Mnode::RatArith(
                        RatArithOp::Plus,
                        Box::new(to_rat(*a)),
                        Box::new(to_rat(*b)),
                    ),
                    trat_pair(),
                    loc,
                ),
                Mnode::Minus(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => Mterm::new(
                    Mnode::RatArith(
                        RatArithOp::Minus,
                        Box::new(to_rat(*a)),
                        Box::new(to_rat(*b)),
                    ),
                    trat_pair(),
                    loc,
                ),
                Mnode::Mult(a, b) if a.type_.node == Tnode::Rational && b.type_.node == Tnode::Currency => {
                    Mterm::new(Mnode::RatTez(a, b), tcurrency(), loc)
                }
                Mnode::Mult(a, b) if a.type_.node == Tnode::Currency && b.type_.node == Tnode::Rational => {
                    Mterm::new(Mnode::RatTez(b, a), tcurrency(), loc)
                }
                Mnode::Mult(a, b) if a.type_.node == Tnode::Rational && b.type_.node == Tnode::Duration => {
                    Mterm::new(Mnode::RatDur(a, b), tduration(), loc)
                }
                Mnode::Mult(a, b) if a.type_.node == Tnode::Duration && b.type_.node == Tnode::Rational => {
                    Mterm::new(Mnode::RatDur(b, a), tduration(), loc)
                }
                Mnode::Mult(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => Mterm::new(
                    Mnode::RatArith(
                        RatArithOp::Mult,
                        Box::new(to_rat(*a)),
                        Box::new(to_rat(*b)),
                    ),
                    trat_pair(),
                    loc,
                ),
                Mnode::Div(a, b) if is_rat(&a.type_) || is_rat(&b.type_) => Mterm::new(
                    Mnode::RatArith(
                        RatArithOp::Div,
                        Box::new(to_rat(*a)),
                        Box::new(to_rat(*b)),
                    ),
                    trat_pair(),
                    loc,
                ),
                Mnode::UMinus(a) if is_rat(&a.type_) => {
                    Mterm::new(Mnode::RatUminus(a), trat_pair(), loc)
                }
                node => Mterm::new(node, s.type_, loc),
            }
        })
    });
    map_model_types(model, &mut |ty| {
        ty.rewrite(&mut |t| match t.node {
            Tnode::Rational => {
                let annot = t.annot;
                let mut out = trat_pair();
                out.annot = annot;
                out
            }
            _ => t,
        })
    })
}

// ============================================================================
// update_nat_int_rat
// ============================================================================

fn as_rat_lit(t: &Mterm) -> Option<(i128, u128)> {
    match &t.node {
        Mnode::Rational(n, d) => Some((*n, *d)),
        Mnode::Tuple(items) if items.len() == 2 => match (&items[0].node, &items[1].node) {
            (Mnode::Int(n), Mnode::Nat(d)) => Some((*n, *d)),
            _ => None,
        },
        _ => None,
    }
}

/// Fold literal numeric operations: integer arithmetic and the rational
/// primitives over literal pairs. Results are not normalised to lowest
/// terms.
pub fn update_nat_int_rat(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let loc = s.loc;
            match &s.node {
                Mnode::Plus(a, b) => match (&a.node, &b.node) {
                    (Mnode::Int(x), Mnode::Int(y)) => mint(x + y).with_loc(loc),
                    (Mnode::Nat(x), Mnode::Nat(y)) => mnat(x + y).with_loc(loc),
                    _ => s,
                },
                Mnode::Mult(a, b) => match (&a.node, &b.node) {
                    (Mnode::Int(x), Mnode::Int(y)) => mint(x * y).with_loc(loc),
                    (Mnode::Nat(x), Mnode::Nat(y)) => mnat(x * y).with_loc(loc),
                    _ => s,
                },
                Mnode::Minus(a, b) => match (&a.node, &b.node) {
                    (Mnode::Int(x), Mnode::Int(y)) => mint(x - y).with_loc(loc),
                    _ => s,
                },
                Mnode::UMinus(a) => match &a.node {
                    Mnode::Int(x) => mint(-x).with_loc(loc),
                    _ => s,
                },
                Mnode::Builtin(BuiltinFn::IntToRat, args) if args.len() == 1 => {
                    match &args[0].node {
                        Mnode::Int(x) => mrat_pair(*x, 1).with_loc(loc),
                        _ => s,
                    }
                }
                Mnode::Builtin(BuiltinFn::NatToRat, args) if args.len() == 1 => {
                    match &args[0].node {
                        Mnode::Nat(x) => mrat_pair(*x as i128, 1).with_loc(loc),
                        _ => s,
                    }
                }
                Mnode::RatUminus(a) => match as_rat_lit(a) {
                    Some((n, d)) => mrat_pair(-n, d).with_loc(loc),
                    None => s,
                },
                Mnode::RatEq(a, b) => match (as_rat_lit(a), as_rat_lit(b)) {
                    (Some((an, ad)), Some((bn, bd))) => {
                        mbool(an * bd as i128 == bn * ad as i128).with_loc(loc)
                    }
                    _ => s,
                },
                Mnode::RatCmp(op, a, b) => match (as_rat_lit(a), as_rat_lit(b)) {
                    (Some((an, ad)), Some((bn, bd))) => {
                        let l = an * bd as i128;
                        let r = bn * ad as i128;
                        let v = match op {
                            CmpKind::Lt => l < r,
                            CmpKind::Le => l <= r,
                            CmpKind::Gt => l > r,
                            CmpKind::Ge => l >= r,
                        };
                        mbool(v).with_loc(loc)
                    }
                    _ => s,
                },
                Mnode::RatArith(op, a, b) => match (as_rat_lit(a), as_rat_lit(b)) {
                    (Some((an, ad)), Some((bn, bd))) => {
                        let folded = match op {
                            RatArithOp::Plus => {
                                Some((an * bd as i128 + bn * ad as i128, ad * bd))
                            }
                            RatArithOp::Minus => {
                                Some((an * bd as i128 - bn * ad as i128, ad * bd))
                            }
                            RatArithOp::Mult => Some((an * bn, ad * bd)),
                            RatArithOp::Div => {
                                if bn == 0 {
                                    None
                                } else if bn < 0 {
                                    Some((-(an * bd as i128), ad * bn.unsigned_abs()))
                                } else {
                                    Some((an * bd as i128, ad * bn as u128))
                                }
                            }
                        };
                        match folded {
                            Some((n, d)) => mrat_pair(n, d).with_loc(loc),
                            None => s,
                        }
                    }
                    _ => s,
                },
                _ => s,
            }
        })
    })
}

// ============================================================================
// replace_date_duration_by_timestamp
// ============================================================================

/// `date` maps to `timestamp` and `duration` to `int`; literals take their
/// epoch representation. `now` stays symbolic.
pub fn replace_date_duration_by_timestamp(model: Model) -> Model {
    let model = map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let loc = s.loc;
            match s.node {
                Mnode::Date(d) => mtimestamp(d.timestamp()).with_loc(loc),
                Mnode::Duration(secs) => mint(secs as i128).with_loc(loc),
                Mnode::Mult(a, b)
                    if a.type_.node == Tnode::Rational && b.type_.node == Tnode::Duration =>
                {
                    Mterm::new(Mnode::RatDur(a, b), tint(), loc)
                }
                Mnode::Mult(a, b)
                    if a.type_.node == Tnode::Duration && b.type_.node == Tnode::Rational =>
                {
                    Mterm::new(Mnode::RatDur(b, a), tint(), loc)
                }
                node => Mterm::new(node, s.type_, loc),
            }
        })
    });
    map_model_types(model, &mut |ty| {
        ty.rewrite(&mut |t| match t.node {
            Tnode::Date => {
                let mut out = ttimestamp();
                out.annot = t.annot;
                out
            }
            Tnode::Duration => {
                let mut out = tint();
                out.annot = t.annot;
                out
            }
            _ => t,
        })
    })
}

// ============================================================================
// abs_tez
// ============================================================================

/// The VM multiplies currency by `nat` only: wrap `int` factors with `abs`
pub fn abs_tez(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            let Mnode::Mult(a, b) = s.node else { return s };
            let wrap = |x: Mterm| -> Mterm {
                if x.type_.node == Tnode::Int {
                    Mterm::synthesised(Mnode::Builtin(BuiltinFn::Abs, vec![x]), tnat())
                } else {
                    x
                }
            };
            match (&a.type_.node, &b.type_.node) {
                (Tnode::Currency, _) => {
                    let b = wrap(*b);
                    Mterm::new(Mnode::Mult(a, Box::new(b)), s.type_, s.loc)
                }
                (_, Tnode::Currency) => {
                    let a = wrap(*a);
                    Mterm::new(Mnode::Mult(Box::new(a), b), s.type_, s.loc)
                }
                _ => Mterm::new(Mnode::Mult(a, b), s.type_, s.loc),
            }
        })
    })
}

// ============================================================================
// process_internal_string
// ============================================================================

/// `string + string` becomes `concat`
pub fn process_internal_string(model: Model) -> Model {
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| match s.node {
            Mnode::Plus(a, b)
                if a.type_.node == Tnode::String && b.type_.node == Tnode::String =>
            {
                Mterm::new(
                    Mnode::Builtin(BuiltinFn::Concat, vec![*a, *b]),
                    tstring(),
                    s.loc,
                )
            }
            node => Mterm::new(node, s.type_, s.loc),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Decl;

    fn entry_model(body: Mterm) -> Model {
        let mut m = Model::new("test");
        m.functions
            .push(FunctionBuilder::entry("go").body(body).build());
        m
    }

    #[test]
    fn rational_literal_becomes_int_nat_pair() {
        let body = massign_var("r", mrational(1, 2));
        let out = remove_rational(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        assert_eq!(**value, mrat_pair(1, 2));
        assert_eq!(value.type_, trat_pair());
    }

    #[test]
    fn rational_addition_uses_ratarith() {
        // r1 + (1/3) * f
        let r1 = mvar_local("r1", trat());
        let f = mvar_local("f", trat());
        let body = massign_var(
            "r",
            Mterm::synthesised(
                Mnode::Plus(
                    Box::new(r1),
                    Box::new(Mterm::synthesised(
                        Mnode::Mult(Box::new(mrational(1, 3)), Box::new(f)),
                        trat(),
                    )),
                ),
                trat(),
            ),
        );
        let out = remove_rational(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::RatArith(RatArithOp::Plus, _, rhs) = &value.node else {
            panic!("expected ratarith plus, got {:?}", value.node)
        };
        assert!(matches!(rhs.node, Mnode::RatArith(RatArithOp::Mult, _, _)));
    }

    #[test]
    fn literal_rational_arithmetic_folds_without_normalising() {
        // 1/2 + 1/3 = 5/6 ; 1/2 * 2/4 = 2/8 (not reduced)
        let body = mseq(vec![
            massign_var(
                "a",
                Mterm::synthesised(
                    Mnode::RatArith(
                        RatArithOp::Plus,
                        Box::new(mrat_pair(1, 2)),
                        Box::new(mrat_pair(1, 3)),
                    ),
                    trat_pair(),
                ),
            ),
            massign_var(
                "b",
                Mterm::synthesised(
                    Mnode::RatArith(
                        RatArithOp::Mult,
                        Box::new(mrat_pair(1, 2)),
                        Box::new(mrat_pair(2, 4)),
                    ),
                    trat_pair(),
                ),
            ),
        ]);
        let out = update_nat_int_rat(entry_model(body));
        let Mnode::Seq(items) = &out.functions[0].body.node else { panic!() };
        let Mnode::Assign { value, .. } = &items[0].node else { panic!() };
        assert_eq!(**value, mrat_pair(5, 6));
        let Mnode::Assign { value, .. } = &items[1].node else { panic!() };
        assert_eq!(**value, mrat_pair(2, 8));
    }

    #[test]
    fn date_literal_becomes_epoch_timestamp() {
        let d = crate::model::dates::parse_date("2021-06-28T00:00:00Z").unwrap();
        let body = massign_var("d", Mterm::synthesised(Mnode::Date(d), tdate()));
        let out = replace_date_duration_by_timestamp(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        assert_eq!(value.node, Mnode::Timestamp(1624838400));
    }

    #[test]
    fn date_type_maps_to_timestamp_in_decls() {
        let mut m = Model::new("test");
        m.decls.push(Decl::Var(crate::model::VarDecl {
            name: "deadline".into(),
            typ: tdate(),
            kind: crate::model::VarKind::Variable,
            default: None,
            invariants: Vec::new(),
            loc: crate::model::Loc::NONE,
        }));
        let out = replace_date_duration_by_timestamp(m);
        let v = out.get_var("deadline").unwrap();
        assert_eq!(v.typ.node, Tnode::Timestamp);
    }

    #[test]
    fn int_factor_of_currency_is_wrapped_with_abs() {
        let body = massign_var(
            "x",
            Mterm::synthesised(
                Mnode::Mult(
                    Box::new(mvar_local("n", tint())),
                    Box::new(mcurrency(1_000_000)),
                ),
                tcurrency(),
            ),
        );
        let out = abs_tez(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        let Mnode::Mult(a, _) = &value.node else { panic!() };
        assert!(matches!(a.node, Mnode::Builtin(BuiltinFn::Abs, _)));
        assert_eq!(a.type_, tnat());
    }

    #[test]
    fn string_plus_becomes_concat() {
        let body = massign_var(
            "s",
            Mterm::synthesised(
                Mnode::Plus(Box::new(mstring("a")), Box::new(mstring("b"))),
                tstring(),
            ),
        );
        let out = process_internal_string(entry_model(body));
        let Mnode::Assign { value, .. } = &out.functions[0].body.node else {
            panic!()
        };
        assert!(matches!(value.node, Mnode::Builtin(BuiltinFn::Concat, _)));
    }
}

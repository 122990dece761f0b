//! # Housekeeping
//!
//! Back-end accommodation: subterms the code emitter cannot evaluate in
//! nested positions are extracted into `let`-bindings placed before the
//! enclosing instruction.
//!
//! A single generic driver walks every instruction, offers each immediate
//! expression operand to the pass's extractor, and wraps the rebuilt
//! instruction with the collected bindings. Extraction stays on the
//! expression spine: it never hoists out of a conditional branch, which
//! would change evaluation order.
//!
//! ## Pipeline Position
//!
//! ```text
//! whole program -> [housekeeping] -> back-end
//! ```

use crate::model::builders::*;
use crate::model::{Ident, Mnode, Model, Mterm, Tnode};
use crate::traversal::{fold_map_term, map_model_terms, map_term, rewrite_term};

type Bindings = Vec<(Ident, Mterm)>;

/// An extractor offered every expression subterm on the spine; it returns
/// the replacement term and pushes any bindings it created.
type Extractor<'a> = dyn FnMut(Mterm, &mut super::TempGen, &mut Bindings) -> Mterm + 'a;

/// Walk the expression spine, stopping at branching nodes so extraction
/// cannot move a computation across a conditional.
fn extract_on_spine(
    e: Mterm,
    f: &mut Extractor<'_>,
    gen: &mut super::TempGen,
    out: &mut Bindings,
) -> Mterm {
    let branching = matches!(
        e.node,
        Mnode::If { .. }
            | Mnode::Match { .. }
            | Mnode::MatchOr { .. }
            | Mnode::TernaryBool { .. }
            | Mnode::TernaryOption { .. }
            | Mnode::Lambda { .. }
    );
    let e = if branching {
        e
    } else {
        map_term(e, &mut |c| extract_on_spine(c, f, gen, out))
    };
    f(e, gen, out)
}

/// Generic driver: every instruction's immediate expression operands are
/// offered to `f`; created bindings wrap the instruction.
pub fn extract_term_from_instruction(
    model: Model,
    f: &mut Extractor<'_>,
) -> Model {
    let mut gen = super::TempGen::new();
    map_model_terms(model, &mut |_ctx, t| {
        rewrite_term(t, &mut |s| {
            if s.type_.node != Tnode::Unit {
                return s;
            }
            // bindings are already evaluation points, and a while condition
            // must stay inside the loop
            if matches!(
                s.node,
                Mnode::Seq(_)
                    | Mnode::Label(_)
                    | Mnode::Mark { .. }
                    | Mnode::Letin { .. }
                    | Mnode::While { .. }
            ) {
                return s;
            }
            let (rebuilt, bindings) =
                fold_map_term(s, Bindings::new(), &mut |mut acc, child| {
                    if child.type_.node == Tnode::Unit {
                        (child, acc)
                    } else {
                        let child = extract_on_spine(child, f, &mut gen, &mut acc);
                        (child, acc)
                    }
                });
            bindings
                .into_iter()
                .rev()
                .fold(rebuilt, |body, (id, init)| mletin(id, init, body))
        })
    })
}

// ============================================================================
// remove_letin_from_expr
// ============================================================================

/// Let-bindings and statement sequences sitting inside expression operands
/// move out in front of the instruction.
pub fn remove_letin_from_expr(model: Model) -> Model {
    extract_term_from_instruction(model, &mut |e, gen, out| match &e.node {
        Mnode::Letin { .. } | Mnode::Seq(_) if e.type_.node != Tnode::Unit => {
            let id = gen.fresh("_tmp");
            let ty = e.type_.clone();
            out.push((id.clone(), e));
            mvar_local(id, ty)
        }
        _ => e,
    })
}

// ============================================================================
// remove_fun_dotasset
// ============================================================================

/// A field access on a function-call result binds the call first; the
/// emitter cannot project from an unnamed call value.
pub fn remove_fun_dotasset(model: Model) -> Model {
    extract_term_from_instruction(model, &mut |e, gen, out| {
        let Mnode::Dot { expr, field } = &e.node else { return e };
        if !matches!(expr.node, Mnode::App { .. }) {
            return e;
        }
        let id = gen.fresh("_tmp");
        let call_ty = expr.type_.clone();
        out.push((id.clone(), (**expr).clone()));
        Mterm::new(
            Mnode::Dot {
                expr: Box::new(mvar_local(id, call_ty)),
                field: field.clone(),
            },
            e.type_.clone(),
            e.loc,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_model(body: Mterm) -> Model {
        let mut m = Model::new("test");
        m.functions
            .push(FunctionBuilder::entry("go").body(body).build());
        m
    }

    #[test]
    fn letin_in_expression_moves_out() {
        // x := (let y = 1 in y + 2)
        let inner = mletin(
            "y",
            mint(1),
            mplus(mvar_local("y", tint()), mint(2), tint()),
        );
        let body = massign_var("x", inner);
        let out = remove_letin_from_expr(entry_model(body));
        let Mnode::Letin { id, value, body } = &out.functions[0].body.node else {
            panic!("expected hoisted binding, got {:?}", out.functions[0].body.node)
        };
        assert!(id.starts_with("_tmp"));
        assert!(matches!(value.node, Mnode::Letin { .. }));
        let Mnode::Assign { value: v, .. } = &body.node else { panic!() };
        assert!(matches!(&v.node, Mnode::Var { .. }));
    }

    #[test]
    fn conditional_branches_are_not_hoisted() {
        // x := if c then (let y = 1 in y) else 2  -- the inner let stays put
        let branchy = mif_expr(
            mvar_local("c", tbool()),
            mletin("y", mint(1), mvar_local("y", tint())),
            mint(2),
        );
        let body = massign_var("x", branchy);
        let out = remove_letin_from_expr(entry_model(body));
        assert!(
            matches!(out.functions[0].body.node, Mnode::Assign { .. }),
            "nothing to hoist on the spine"
        );
    }

    #[test]
    fn dot_on_call_binds_the_call() {
        let call = Mterm::synthesised(
            Mnode::App {
                func: "lookup".into(),
                args: vec![mnat(1)],
            },
            trecord("thing"),
        );
        let body = massign_var("x", mdot(call, "v", tstring()));
        let out = remove_fun_dotasset(entry_model(body));
        let Mnode::Letin { value, body, .. } = &out.functions[0].body.node else {
            panic!("expected bound call, got {:?}", out.functions[0].body.node)
        };
        assert!(matches!(value.node, Mnode::App { .. }));
        let Mnode::Assign { value: v, .. } = &body.node else { panic!() };
        let Mnode::Dot { expr, .. } = &v.node else { panic!() };
        assert!(matches!(expr.node, Mnode::Var { .. }));
    }
}

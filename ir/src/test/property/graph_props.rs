use proptest::prelude::*;

use tessera_dtype::{DType, TensorType};

use crate::node::{Variable, VariableKind};
use crate::{Composite, FunctionGraph};

use super::generators::*;

fn scalar_inputs(n: usize) -> Vec<Variable> {
    (0..n).map(|i| Variable::scalar(format!("x{i}"), DType::Float64)).collect()
}

fn same_value(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a == b || (a - b).abs() <= 1e-12 * a.abs().max(b.abs())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Float64 expressions stay float64 and keep the broadcast rank.
    #[test]
    fn built_expression_type(expr in arb_expr(2)) {
        let inputs = vec![
            Variable::vector("v", DType::Float64),
            Variable::scalar("s", DType::Float64),
        ];
        let out = expr.build(&inputs).unwrap();
        prop_assert_eq!(out.dtype(), DType::Float64);
        prop_assert!(out.ndim() <= 1);
        if out.ndim() == 1 {
            prop_assert!(out.ty().is_compatible(&TensorType::vector(DType::Float64)));
        }
    }

    /// The client index matches a from-scratch rebuild after any replacement.
    #[test]
    fn replace_keeps_index_consistent(
        expr in arb_expr(3),
        replacement in arb_expr(3),
        pick in any::<prop::sample::Index>(),
    ) {
        let inputs = scalar_inputs(3);
        let out = expr.build(&inputs).unwrap();
        let mut fgraph = FunctionGraph::new(inputs.clone(), [out]).unwrap();
        fgraph.check_integrity().unwrap();

        let mut candidates: Vec<Variable> = fgraph
            .variables()
            .filter(|v| matches!(v.kind(), VariableKind::Output { .. }))
            .cloned()
            .collect();
        candidates.sort_by_key(Variable::id);
        prop_assume!(!candidates.is_empty());

        let target = pick.get(&candidates).clone();
        let new = replacement.build(&inputs).unwrap();
        fgraph.replace(&target, &new, "property").unwrap();

        fgraph.check_integrity().unwrap();
        prop_assert!(!fgraph.contains_variable(&target) || fgraph.client_count(&target) > 0);
        prop_assert_eq!(fgraph.take_imported().iter().filter(|n| !fgraph.contains_node(n)).count(), 0);
    }

    /// A composite built from an expression evaluates like the expression.
    #[test]
    fn composite_matches_reference(expr in arb_expr(2), values in arb_input_values(2)) {
        let inputs = scalar_inputs(2);
        let out = expr.build(&inputs).unwrap();
        let composite = Composite::new(inputs, vec![out]).unwrap();

        let got = composite.perform(&values).unwrap()[0];
        let expected = expr.eval(&values);
        prop_assert!(same_value(got, expected), "{} vs {}", got, expected);
    }
}

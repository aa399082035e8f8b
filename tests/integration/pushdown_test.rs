use anyhow::Result;

use raplan::query::planner::predicate::{extract_columns, resolves_within, split_conjuncts};
use raplan::{CostModel, FilterPushdownOptimizer, RaNode, RaOperator, SelectQuery, TableTarget, build_ra_tree};

// Import test utilities
#[path = "../common/mod.rs"]
mod common;
use common::{customer_orders_query, customer_orders_stats};

// Every selection condition in the plan, in pre-order
fn selection_conditions(plan: &RaNode) -> Vec<String> {
    let mut conditions = Vec::new();
    let mut stack = vec![plan];
    while let Some(node) = stack.pop() {
        if let RaOperator::Selection { condition, .. } = &node.operator {
            conditions.push(condition.clone());
        }
        stack.extend(node.children());
    }
    conditions.sort();
    conditions
}

// A selection directly above a join must not fit entirely on either side
fn assert_fully_pushed(plan: &RaNode) {
    if let RaOperator::Selection { condition, input } = &plan.operator {
        if let RaOperator::Join { left, right, .. } = &input.operator {
            let columns = extract_columns(condition);
            assert!(
                !resolves_within(&columns, &left.aliases()),
                "`{}` could move into the left input",
                condition
            );
            assert!(
                !resolves_within(&columns, &right.aliases()),
                "`{}` could move into the right input",
                condition
            );
        }
    }
    for child in plan.children() {
        assert_fully_pushed(child);
    }
}

fn three_way_query() -> SelectQuery {
    SelectQuery::from_target(TableTarget::aliased_table("customer", "c"))
        .join(TableTarget::aliased_table("orders", "o"), Some("c.id = o.cust_id"))
        .join(TableTarget::aliased_table("nation", "n"), Some("c.nation_id = n.id"))
        .filter("WHERE n.name = 'FR' AND o.amount > 100 AND c.credit > o.amount AND (c.vip = 1 OR c.age > 60)")
        .select(&["c.name"])
}

#[test]
fn test_selection_moves_onto_orders() -> Result<()> {
    let plan = build_ra_tree(&customer_orders_query())?;
    let optimized = FilterPushdownOptimizer::new().optimize(plan);

    let expected = RaNode::join(
        RaNode::relation("customer", Some("c")),
        RaNode::selection("o.amount > 100", RaNode::relation("orders", Some("o"))),
        "c.id = o.cust_id",
    );
    assert_eq!(optimized, expected);
    Ok(())
}

#[test]
fn test_pushdown_lowers_estimated_cost() -> Result<()> {
    let model = CostModel::default();
    let stats = customer_orders_stats();

    let mut original = build_ra_tree(&customer_orders_query())?;
    model.estimate(&mut original, &stats);
    let mut optimized = FilterPushdownOptimizer::new().optimize(original.clone());
    model.estimate(&mut optimized, &stats);

    assert_eq!(original.cumulative_cost(), Some(61000.0));
    // orders selection 500, join max(50, 1000 * 500 * 0.01)
    assert_eq!(optimized.cumulative_cost(), Some(11500.0));
    Ok(())
}

#[test]
fn test_conjuncts_pushed_to_their_sides() -> Result<()> {
    let plan = RaNode::selection(
        "a.x = 1 AND b.y = 2",
        RaNode::join(RaNode::relation("a", None), RaNode::relation("b", None), "a.id = b.id"),
    );
    let optimized = FilterPushdownOptimizer::new().optimize(plan);

    let expected = RaNode::join(
        RaNode::selection("a.x = 1", RaNode::relation("a", None)),
        RaNode::selection("b.y = 2", RaNode::relation("b", None)),
        "a.id = b.id",
    );
    assert_eq!(optimized, expected);
    Ok(())
}

#[test]
fn test_three_way_join_placement() -> Result<()> {
    let plan = build_ra_tree(&three_way_query())?;
    let optimized = FilterPushdownOptimizer::new().optimize(plan);

    // Projection stays on top
    let RaOperator::Projection { input, .. } = &optimized.operator else {
        panic!("Expected Projection at the root");
    };
    assert_fully_pushed(input);

    // The mixed conjunct stays directly above the customer/orders join; the
    // customer-only conjunct that follows it lands on top of that selection
    let expected_inner = RaNode::selection(
        "(c.vip = 1 OR c.age > 60)",
        RaNode::selection(
            "c.credit > o.amount",
            RaNode::join(
                RaNode::relation("customer", Some("c")),
                RaNode::selection("o.amount > 100", RaNode::relation("orders", Some("o"))),
                "c.id = o.cust_id",
            ),
        ),
    );
    let expected = RaNode::join(
        expected_inner,
        RaNode::selection("n.name = 'FR'", RaNode::relation("nation", Some("n"))),
        "c.nation_id = n.id",
    );
    assert_eq!(**input, expected);
    Ok(())
}

#[test]
fn test_conjuncts_are_preserved() -> Result<()> {
    let query = three_way_query();
    let plan = build_ra_tree(&query)?;
    let optimized = FilterPushdownOptimizer::new().optimize(plan);

    let where_text = query.where_clause.as_deref().unwrap_or_default();
    let mut expected = split_conjuncts(where_text.trim_start_matches("WHERE "));
    expected.sort();
    assert_eq!(selection_conditions(&optimized), expected);
    Ok(())
}

// Every join's inputs must answer to disjoint alias sets
fn assert_disjoint_join_inputs(plan: &RaNode) {
    if let RaOperator::Join { left, right, condition } = &plan.operator {
        let left_aliases = left.aliases();
        let right_aliases = right.aliases();
        assert!(
            left_aliases.is_disjoint(&right_aliases),
            "inputs of join `{}` share aliases",
            condition
        );
    }
    for child in plan.children() {
        assert_disjoint_join_inputs(child);
    }
}

#[test]
fn test_join_alias_sets_survive_pushdown() -> Result<()> {
    for query in [customer_orders_query(), three_way_query()] {
        let plan = build_ra_tree(&query)?;
        let aliases_before = plan.aliases();
        let optimized = FilterPushdownOptimizer::new().optimize(plan);

        assert_disjoint_join_inputs(&optimized);
        assert_eq!(optimized.aliases(), aliases_before);
    }

    // The pushed selection sits strictly on the orders side
    let optimized = FilterPushdownOptimizer::new().optimize(build_ra_tree(&customer_orders_query())?);
    let RaOperator::Join { left, right, .. } = &optimized.operator else {
        panic!("Expected Join at the root");
    };
    assert!(matches!(right.operator, RaOperator::Selection { .. }));
    assert!(matches!(left.operator, RaOperator::Relation { .. }));
    let union: Vec<String> = left.aliases().union(&right.aliases()).cloned().collect();
    assert_eq!(union, vec!["c", "customer", "o", "orders"]);
    Ok(())
}

#[test]
fn test_pushdown_is_a_fixed_point() -> Result<()> {
    let optimizer = FilterPushdownOptimizer::new();
    let once = optimizer.optimize(build_ra_tree(&three_way_query())?);
    let twice = optimizer.optimize(once.clone());
    assert_eq!(once, twice);
    Ok(())
}

#[test]
fn test_plan_without_joins_is_unchanged() -> Result<()> {
    let query = SelectQuery::from_target(TableTarget::table("orders"))
        .filter("orders.amount > 100")
        .select(&["orders.id"]);
    let plan = build_ra_tree(&query)?;
    let optimized = FilterPushdownOptimizer::new().optimize(plan.clone());
    assert_eq!(optimized, plan);
    Ok(())
}

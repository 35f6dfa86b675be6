// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Selector translation to SQL over the `resource_labels` side-table.
//!
//! Every requirement becomes one correlated `EXISTS` / `NOT EXISTS`
//! subquery against the label rows of the owning resource, and requirements
//! are joined with `AND`. Ordering operators use the numeric columns that
//! the store fills with [`Number::parse`](super::Number::parse), so they
//! agree with in-memory evaluation.

use sqlx::{QueryBuilder, Sqlite};

use super::{Number, Operator, Requirement, Result, Selector};

/// Append ` AND <condition>` for every requirement of `selector`.
///
/// `owner` is the trusted SQL expression for the owning resource id,
/// e.g. `r.id`. An empty selector appends nothing.
pub fn push_selector(
    builder: &mut QueryBuilder<'_, Sqlite>,
    owner: &str,
    selector: &Selector,
) -> Result<()> {
    for requirement in selector.requirements() {
        builder.push(" AND ");
        push_requirement(builder, owner, requirement)?;
    }
    Ok(())
}

fn push_label_subquery(
    builder: &mut QueryBuilder<'_, Sqlite>,
    owner: &str,
    negate: bool,
    key: &str,
) {
    if negate {
        builder.push("NOT ");
    }
    builder.push("EXISTS (SELECT 1 FROM resource_labels l WHERE l.owner_id = ");
    builder.push(owner);
    builder.push(" AND l.key = ");
    builder.push_bind(key.to_string());
}

fn push_value_set(builder: &mut QueryBuilder<'_, Sqlite>, values: &[String]) {
    builder.push(" AND l.value IN (");
    let mut separated = builder.separated(", ");
    for value in values {
        separated.push_bind(value.clone());
    }
    separated.push_unseparated(")");
}

fn push_requirement(
    builder: &mut QueryBuilder<'_, Sqlite>,
    owner: &str,
    requirement: &Requirement,
) -> Result<()> {
    let key = requirement.key();
    match requirement.operator() {
        Operator::Exists => push_label_subquery(builder, owner, false, key),
        Operator::DoesNotExist => push_label_subquery(builder, owner, true, key),
        Operator::Equals => {
            let value = requirement.single_value()?;
            push_label_subquery(builder, owner, false, key);
            builder.push(" AND l.value = ");
            builder.push_bind(value.to_string());
        }
        Operator::NotEquals => {
            // Key present AND value differs; a missing key never matches.
            let value = requirement.single_value()?;
            push_label_subquery(builder, owner, false, key);
            builder.push(" AND l.value <> ");
            builder.push_bind(value.to_string());
        }
        Operator::In => {
            push_label_subquery(builder, owner, false, key);
            push_value_set(builder, requirement.values());
        }
        Operator::NotIn => {
            push_label_subquery(builder, owner, true, key);
            push_value_set(builder, requirement.values());
        }
        Operator::GreaterThan | Operator::LessThan => {
            let op = if requirement.operator() == Operator::GreaterThan {
                " > "
            } else {
                " < "
            };
            match Number::parse(requirement.single_value()?) {
                Some(Number::Int(n)) => {
                    push_label_subquery(builder, owner, false, key);
                    builder.push(" AND l.int_value IS NOT NULL AND l.int_value");
                    builder.push(op);
                    builder.push_bind(n);
                }
                Some(Number::Float(n)) => {
                    push_label_subquery(builder, owner, false, key);
                    builder.push(" AND l.float_value IS NOT NULL AND l.float_value");
                    builder.push(op);
                    builder.push_bind(n);
                }
                None => {
                    // Non-numeric operand: unsatisfiable.
                    builder.push("0 = 1");
                    return Ok(());
                }
            }
        }
    }
    builder.push(")");
    Ok(())
}

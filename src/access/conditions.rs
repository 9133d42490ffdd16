use serde::{Deserialize, Serialize};

use crate::{
    crypto::sha256_hex,
    error::{AccessControlError, DidHealthResult},
};

/// parameter placeholder substituted with the requesting wallet
pub const USER_ADDRESS_PARAM: &str = ":userAddress";

/// condition type of a plain EVM contract read
pub const EVM_BASIC: &str = "evmBasic";

pub const COMPARATORS: [&str; 7] = ["=", "!=", ">", ">=", "<", "<=", "contains"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnValueTest {
    pub comparator: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_type: Option<String>,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub standard_contract_type: String,
    pub chain: String,
    #[serde(default, alias = "functionName")]
    pub method: String,
    #[serde(alias = "functionParams")]
    pub parameters: Vec<String>,
    pub return_value_test: ReturnValueTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOperator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorEntry {
    pub operator: BooleanOperator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionEntry {
    Operator(OperatorEntry),
    Condition(AccessControlCondition),
}

/// Ordered list of conditions joined by boolean operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessControlConditions(pub Vec<ConditionEntry>);

impl AccessControlConditions {
    /// Only `wallet` may decrypt.
    pub fn self_only(chain: &str, wallet: &str) -> Self {
        Self(vec![ConditionEntry::Condition(AccessControlCondition {
            condition_type: None,
            contract_address: String::new(),
            standard_contract_type: String::new(),
            chain: chain.to_string(),
            method: String::new(),
            parameters: vec![USER_ADDRESS_PARAM.to_string()],
            return_value_test: ReturnValueTest {
                comparator: "=".to_string(),
                value: wallet.to_string(),
            },
        })])
    }

    /// `wallet` or any of `others` may decrypt.
    pub fn any_of(chain: &str, wallet: &str, others: &[&str]) -> Self {
        let mut entries = Self::self_only(chain, wallet).0;
        for other in others {
            entries.push(ConditionEntry::Operator(OperatorEntry {
                operator: BooleanOperator::Or,
            }));
            entries.extend(Self::self_only(chain, other).0);
        }
        Self(entries)
    }

    /// Any approved member of the DAO at `dao_address` may decrypt.
    pub fn dao_members(chain: &str, dao_address: &str) -> Self {
        Self(vec![ConditionEntry::Condition(AccessControlCondition {
            condition_type: Some(EVM_BASIC.to_string()),
            contract_address: dao_address.to_string(),
            standard_contract_type: String::new(),
            chain: chain.to_string(),
            method: "isMember".to_string(),
            parameters: vec![USER_ADDRESS_PARAM.to_string()],
            return_value_test: ReturnValueTest {
                comparator: "=".to_string(),
                value: "true".to_string(),
            },
        })])
    }

    pub fn from_json(json: &str) -> DidHealthResult<Self> {
        let conditions: Self = serde_json::from_str(json).map_err(|e| {
            AccessControlError::InvalidConditions(format!("not a condition array: {e}"))
        })?;
        conditions.validate()?;
        Ok(conditions)
    }

    pub fn entries(&self) -> &[ConditionEntry] {
        &self.0
    }

    /// conditions in order, operators skipped
    pub fn conditions(&self) -> impl Iterator<Item = &AccessControlCondition> {
        self.0.iter().filter_map(|e| match e {
            ConditionEntry::Condition(c) => Some(c),
            ConditionEntry::Operator(_) => None,
        })
    }

    /// Structural check: non-empty, conditions and operators alternate starting and
    /// ending with a condition, every condition names a chain, a parameter and a known comparator.
    pub fn validate(&self) -> DidHealthResult<()> {
        if self.0.is_empty() {
            return Err(invalid("at least one condition is required"));
        }
        for (index, entry) in self.0.iter().enumerate() {
            let expect_condition = index % 2 == 0;
            match (entry, expect_condition) {
                (ConditionEntry::Condition(condition), true) => validate_condition(index, condition)?,
                (ConditionEntry::Operator(_), false) => {}
                (ConditionEntry::Condition(_), false) => {
                    return Err(invalid(&format!("entry {index}: expected an operator")));
                }
                (ConditionEntry::Operator(_), true) => {
                    return Err(invalid(&format!("entry {index}: expected a condition")));
                }
            }
        }
        if self.0.len() % 2 == 0 {
            return Err(invalid("conditions must not end with an operator"));
        }
        Ok(())
    }

    /// sha256 over the canonical JSON form; equal arrays hash equally
    pub fn conditions_hash(&self) -> DidHealthResult<String> {
        let canonical = serde_json::to_vec(&self.0)?;
        Ok(sha256_hex(&canonical))
    }
}

fn validate_condition(index: usize, condition: &AccessControlCondition) -> DidHealthResult<()> {
    if condition.chain.trim().is_empty() {
        return Err(invalid(&format!("entry {index}: chain is required")));
    }
    if condition.parameters.is_empty() {
        return Err(invalid(&format!("entry {index}: at least one parameter is required")));
    }
    if !COMPARATORS.contains(&condition.return_value_test.comparator.as_str()) {
        return Err(invalid(&format!(
            "entry {index}: unknown comparator {}",
            condition.return_value_test.comparator
        )));
    }
    Ok(())
}

fn invalid(reason: &str) -> crate::error::DidHealthError {
    AccessControlError::InvalidConditions(reason.to_string()).into()
}

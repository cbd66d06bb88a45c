use std::collections::HashSet;
use crate::error::{Error, Result};
use crate::types::ids::OperatorId;

/// Operators allowed to change aggregator configuration.
#[derive(Clone, Debug)]
pub struct AccessControl {
    operators: HashSet<OperatorId>,
}

impl AccessControl {
    pub fn new(initial: OperatorId) -> Self {
        let mut operators = HashSet::new();
        operators.insert(initial);
        AccessControl { operators }
    }

    pub fn is_authorized(&self, operator: OperatorId) -> bool {
        self.operators.contains(&operator)
    }

    pub fn ensure_authorized(&self, operator: OperatorId) -> Result<()> {
        if !self.is_authorized(operator) {
            tracing::warn!(%operator, "Rejected unauthorized configuration call");
            return Err(Error::Unauthorized(operator));
        }
        Ok(())
    }

    pub fn grant(&mut self, caller: OperatorId, operator: OperatorId) -> Result<()> {
        self.ensure_authorized(caller)?;
        if self.operators.insert(operator) {
            tracing::info!(%caller, %operator, "Granted operator role");
        }
        Ok(())
    }

    pub fn revoke(&mut self, caller: OperatorId, operator: OperatorId) -> Result<()> {
        self.ensure_authorized(caller)?;
        if !self.operators.contains(&operator) {
            return Ok(());
        }
        if self.operators.len() == 1 {
            return Err(Error::LastOperator);
        }
        self.operators.remove(&operator);
        tracing::info!(%caller, %operator, "Revoked operator role");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_and_revoke() {
        let admin = OperatorId::new();
        let other = OperatorId::new();
        let mut access = AccessControl::new(admin);

        assert!(matches!(access.grant(other, other), Err(Error::Unauthorized(_))));
        access.grant(admin, other).unwrap();
        assert!(access.is_authorized(other));

        access.revoke(other, admin).unwrap();
        assert!(!access.is_authorized(admin));
        assert!(matches!(access.revoke(other, other), Err(Error::LastOperator)));
        assert_eq!(access.len(), 1);
    }
}

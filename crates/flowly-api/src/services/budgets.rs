// Budget read service
// Budgets are written only by onboarding submit; this is the owner's view of them.

use flowly_core::validation::validate_user_id;
use flowly_core::{BudgetStore, BudgetWithPayCycle, FlowlyError, Result};
use std::sync::Arc;
use uuid::Uuid;

pub struct BudgetService {
    store: Arc<dyn BudgetStore>,
}

impl BudgetService {
    pub fn new(store: Arc<dyn BudgetStore>) -> Self {
        Self { store }
    }

    /// The user's budgets with their pay cycles, newest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<BudgetWithPayCycle>> {
        validate_user_id(user_id)?;
        let budgets = self.store.list_budgets_by_user_id(user_id).await?;

        let mut listed = Vec::with_capacity(budgets.len());
        for budget in budgets {
            let pay_cycle = self.store.find_pay_cycle_by_budget_id(budget.id).await?;
            listed.push(BudgetWithPayCycle { budget, pay_cycle });
        }
        Ok(listed)
    }

    /// One budget owned by the user; someone else's budget is not found
    pub async fn get(&self, user_id: &str, budget_id: Uuid) -> Result<BudgetWithPayCycle> {
        validate_user_id(user_id)?;
        let budget = self
            .store
            .find_budget_by_id(budget_id)
            .await?
            .filter(|budget| budget.user_id == user_id)
            .ok_or_else(|| FlowlyError::not_found("Budget not found."))?;

        let pay_cycle = self.store.find_pay_cycle_by_budget_id(budget.id).await?;
        Ok(BudgetWithPayCycle { budget, pay_cycle })
    }
}

//! Circulation dashboard figures.

use serde::{Deserialize, Serialize};

use shelf_circulation::{ItemCirculation, LoanStatus};

/// Point-in-time counts across every registered item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CirculationSummary {
    pub total_loans: usize,
    pub pending_loans: usize,
    pub active_loans: usize,
    pub overdue_loans: usize,
    pub returned_loans: usize,
    /// Fines assessed and not yet paid, in minor units.
    pub outstanding_fines: u64,
    pub total_items: usize,
    pub items_in_stock: usize,
    /// Items with copies that are all on loan.
    pub items_checked_out: usize,
    pub active_reservations: usize,
}

impl CirculationSummary {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a ItemCirculation>) -> Self {
        let mut summary = Self::default();

        for item in items {
            summary.total_items += 1;
            let inventory = item.inventory();
            if inventory.has_stock() {
                summary.items_in_stock += 1;
            } else if inventory.total_copies() > 0 {
                summary.items_checked_out += 1;
            }
            summary.active_reservations += item.queue().active_count() as usize;

            for loan in item.loans() {
                summary.total_loans += 1;
                match loan.status() {
                    LoanStatus::Pending => summary.pending_loans += 1,
                    LoanStatus::Active => summary.active_loans += 1,
                    LoanStatus::Overdue => summary.overdue_loans += 1,
                    LoanStatus::Returned => summary.returned_loans += 1,
                }
                summary.outstanding_fines = summary.outstanding_fines.saturating_add(loan.fine_amount());
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shelf_circulation::{CirculationEvent, ItemId, ItemRegistered};
    use shelf_core::AggregateId;

    fn registered(total_copies: u32) -> ItemCirculation {
        let item_id = ItemId::new(AggregateId::new());
        let mut item = ItemCirculation::empty(item_id);
        item.apply(&CirculationEvent::ItemRegistered(ItemRegistered {
            item_id,
            total_copies,
            occurred_at: Utc::now(),
        }));
        item
    }

    #[test]
    fn empty_catalog_summarizes_to_zero() {
        assert_eq!(CirculationSummary::from_items(&Vec::<ItemCirculation>::new()), CirculationSummary::default());
    }

    #[test]
    fn items_without_copies_are_neither_in_stock_nor_checked_out() {
        let items = vec![registered(2), registered(0)];
        let summary = CirculationSummary::from_items(&items);

        assert_eq!(summary.total_items, 2);
        assert_eq!(summary.items_in_stock, 1);
        assert_eq!(summary.items_checked_out, 0);
        assert_eq!(summary.total_loans, 0);
    }
}

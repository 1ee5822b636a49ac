//! Money and inventory plans for each lifecycle event.
//!
//! A plan is built from the frozen transaction snapshots alone, so it can be checked without a database. The backend
//! executes every step of a plan inside the same database transaction that records the state change.
//!
//! | Event                | Ledger moves                                          | Inventory                  |
//! |----------------------|-------------------------------------------------------|----------------------------|
//! | payment confirmation | promotion −P, platform +S (wallet payments: buyer −T) | none                       |
//! | complete             | platform −S, merchant +S                              | pending −q, sale count +q  |
//! | cancel / refund      | platform −S, buyer +T, promotion +P                   | every reservation released |
//! | payment failure      | none                                                  | every reservation released |
//!
//! where `S` is the settlement amount, `T` the total paid and `P = S − T` the promotion subsidy.
use mse_common::Money;

use crate::db_types::{
    AccountSelector,
    LedgerMove,
    MovementReason,
    PaymentMethod,
    PaymentRecord,
    PlatformAccounts,
    SettlementOutcome,
    Transaction,
};

/// One inventory adjustment. Negative deltas reserve, positive deltas release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocatorOp {
    Stock { product_id: i64, variant_id: i64, delta: i64 },
    PendingSale { product_id: i64, delta: i64 },
    SaleCount { product_id: i64, merchant_id: i64, quantity: i64 },
    PromotionQuota { promotion_id: i64, delta: i64 },
    MarketplaceVoucherQuota { voucher_id: i64, delta: i64 },
    MerchantVoucherQuota { merchant_domain: String, voucher_id: i64, delta: i64 },
}

impl AllocatorOp {
    /// The operation that undoes this one. Sale counts are never undone.
    pub fn inverse(&self) -> Option<AllocatorOp> {
        use AllocatorOp::*;
        let op = match self {
            Stock { product_id, variant_id, delta } => {
                Stock { product_id: *product_id, variant_id: *variant_id, delta: -delta }
            },
            PendingSale { product_id, delta } => PendingSale { product_id: *product_id, delta: -delta },
            SaleCount { .. } => return None,
            PromotionQuota { promotion_id, delta } => PromotionQuota { promotion_id: *promotion_id, delta: -delta },
            MarketplaceVoucherQuota { voucher_id, delta } => {
                MarketplaceVoucherQuota { voucher_id: *voucher_id, delta: -delta }
            },
            MerchantVoucherQuota { merchant_domain, voucher_id, delta } => {
                let merchant_domain = merchant_domain.clone();
                MerchantVoucherQuota { merchant_domain, voucher_id: *voucher_id, delta: -delta }
            },
        };
        Some(op)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementPlan {
    pub moves: Vec<LedgerMove>,
    pub allocations: Vec<AllocatorOp>,
}

impl SettlementPlan {
    /// Sum of all ledger deltas. Zero for every plan except a gateway payment confirmation, where it equals the money
    /// that entered from outside.
    pub fn net_flow(&self) -> Money {
        self.moves.iter().map(|m| m.delta).sum()
    }

    fn push_move(&mut self, mv: LedgerMove) {
        if !mv.delta.is_zero() {
            self.moves.push(mv);
        }
    }

    /// The inventory a transaction holds from checkout until it settles.
    pub fn reservations(tx: &Transaction) -> Vec<AllocatorOp> {
        let mut ops = Vec::with_capacity(tx.cart_items.len() * 3 + 2);
        for item in tx.cart_items.iter() {
            ops.push(AllocatorOp::Stock {
                product_id: item.product_id,
                variant_id: item.variant_id,
                delta: -item.quantity,
            });
            ops.push(AllocatorOp::PendingSale { product_id: item.product_id, delta: item.quantity });
            if let Some(promotion_id) = item.promotion_id {
                ops.push(AllocatorOp::PromotionQuota { promotion_id, delta: -item.quantity });
            }
        }
        if let Some(voucher_id) = tx.marketplace_voucher_id {
            ops.push(AllocatorOp::MarketplaceVoucherQuota { voucher_id, delta: -1 });
        }
        if let Some(voucher_id) = tx.merchant_voucher_id {
            ops.push(AllocatorOp::MerchantVoucherQuota {
                merchant_domain: tx.merchant_domain.clone(),
                voucher_id,
                delta: -1,
            });
        }
        ops
    }

    /// Gives back everything [`Self::reservations`] took.
    pub fn release(tx: &Transaction) -> Self {
        let allocations = Self::reservations(tx).iter().filter_map(AllocatorOp::inverse).collect();
        Self { moves: vec![], allocations }
    }

    /// Moves the paid money (plus the promotion subsidy) into the platform account.
    pub fn payment_confirmation(payment: &PaymentRecord, txs: &[Transaction], accounts: &PlatformAccounts) -> Self {
        let mut plan = Self::default();
        if payment.method == PaymentMethod::Wallet {
            let total: Money = txs.iter().map(Transaction::total_paid).sum();
            plan.push_move(
                LedgerMove::new(AccountSelector::ByUserId(payment.buyer_id), -total, MovementReason::Payment)
                    .for_payment(payment.id.as_str()),
            );
        }
        for tx in txs {
            plan.push_move(
                LedgerMove::new(accounts.promotion(), -tx.promotion_amount(), MovementReason::Promotion)
                    .for_transaction(tx.id),
            );
            plan.push_move(
                LedgerMove::new(accounts.platform(), tx.settlement_amount(), MovementReason::Payment)
                    .for_transaction(tx.id)
                    .for_payment(payment.id.as_str()),
            );
        }
        plan
    }

    /// The plan that takes a paid transaction to `outcome`.
    pub fn settlement(tx: &Transaction, outcome: SettlementOutcome, accounts: &PlatformAccounts) -> Self {
        let mut plan = Self::default();
        let settlement = tx.settlement_amount();
        match outcome {
            SettlementOutcome::Completed => {
                let merchant = AccountSelector::ByMerchantId(tx.merchant_id);
                plan.push_move(
                    LedgerMove::new(accounts.platform(), -settlement, MovementReason::Settlement)
                        .for_transaction(tx.id),
                );
                plan.push_move(
                    LedgerMove::new(merchant, settlement, MovementReason::Settlement).for_transaction(tx.id),
                );
                for item in tx.cart_items.iter() {
                    let product_id = item.product_id;
                    plan.allocations.push(AllocatorOp::PendingSale { product_id, delta: -item.quantity });
                    plan.allocations.push(AllocatorOp::SaleCount {
                        product_id: item.product_id,
                        merchant_id: tx.merchant_id,
                        quantity: item.quantity,
                    });
                }
            },
            SettlementOutcome::Canceled | SettlementOutcome::Refunded => {
                plan.push_move(
                    LedgerMove::new(accounts.platform(), -settlement, MovementReason::Refund).for_transaction(tx.id),
                );
                plan.push_move(
                    LedgerMove::new(AccountSelector::ByUserId(tx.buyer_id), tx.total_paid(), MovementReason::Refund)
                        .for_transaction(tx.id),
                );
                plan.push_move(
                    LedgerMove::new(accounts.promotion(), tx.promotion_amount(), MovementReason::Promotion)
                        .for_transaction(tx.id),
                );
                plan.allocations = Self::release(tx).allocations;
            },
        }
        plan
    }
}

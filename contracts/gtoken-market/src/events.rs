use soroban_sdk::{contractevent, Address};

/// Mirrors Compound's Mint event: emitted when gTokens are minted against a
/// deposit.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mint {
    #[topic]
    pub minter: Address,
    pub mint_amount: u128,
    pub mint_tokens: u128,
}

/// Mirrors Compound's Redeem event: emitted when gTokens are burned.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Redeem {
    #[topic]
    pub redeemer: Address,
    pub redeem_amount: u128,
    pub redeem_tokens: u128,
}

/// Mirrors Compound's Borrow event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BorrowEvent {
    #[topic]
    pub borrower: Address,
    pub borrow_amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

/// Mirrors Compound's RepayBorrow event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RepayBorrow {
    #[topic]
    pub payer: Address,
    #[topic]
    pub borrower: Address,
    pub repay_amount: u128,
    pub account_borrows: u128,
    pub total_borrows: u128,
}

/// Mirrors Compound's LiquidateBorrow event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LiquidateBorrow {
    #[topic]
    pub liquidator: Address,
    #[topic]
    pub borrower: Address,
    pub repay_amount: u128,
    pub collateral_market: Address,
    pub seize_tokens: u128,
}

/// gToken transfer between accounts, including forced seizure transfers.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transfer {
    #[topic]
    pub from: Address,
    #[topic]
    pub to: Address,
    pub amount: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Approval {
    #[topic]
    pub owner: Address,
    #[topic]
    pub spender: Address,
    pub amount: u128,
}

/// Mirrors Compound's NewAdmin event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewAdmin {
    #[topic]
    pub admin: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewComptroller {
    #[topic]
    pub comptroller: Address,
}

/// Flash loan premium update.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewFlashLoanFee {
    pub fee_mantissa: u128,
}

/// Flash loan execution log.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlashLoan {
    #[topic]
    pub receiver: Address,
    pub amount: u128,
    pub fee_paid: u128,
}

/// Mirrors Compound's ReservesReduced event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReservesReduced {
    pub reduce_amount: u128,
    pub total_reserves: u128,
}

use soroban_sdk::{contractevent, Address};

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AdminUpdated {
    #[topic]
    pub admin: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OracleUpdated {
    #[topic]
    pub oracle: Address,
}

/// Mirrors Compound's MarketListed event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketListed {
    #[topic]
    pub market: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketEntered {
    #[topic]
    pub account: Address,
    #[topic]
    pub market: Address,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarketExited {
    #[topic]
    pub account: Address,
    #[topic]
    pub market: Address,
}

/// Mirrors Compound's NewCollateralFactor event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewCollateralFactor {
    #[topic]
    pub market: Address,
    pub collateral_factor_mantissa: u128,
}

/// Mirrors Compound's NewCloseFactor event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewCloseFactor {
    pub close_factor_mantissa: u128,
}

/// Mirrors Compound's NewLiquidationIncentive event.
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewLiquidationIncentive {
    pub incentive_mantissa: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewProtocolSeizeShare {
    pub seize_share_mantissa: u128,
}

#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewReserveRecipient {
    #[topic]
    pub recipient: Address,
}

//! Lending pool interfaces (Aave v2 layout).
//!
//! The pool moves funds; the protocol data provider exposes per-user reserve
//! balances and per-asset risk parameters in basis points.

use alloy::sol;

sol! {
    /// Lending pool entry points used for looping and plain lending.
    #[derive(Debug)]
    interface ILendingPool {
        function deposit(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function withdraw(address asset, uint256 amount, address to) external returns (uint256);
        function borrow(address asset, uint256 amount, uint256 interestRateMode, uint16 referralCode, address onBehalfOf) external;
        function repay(address asset, uint256 amount, uint256 rateMode, address onBehalfOf) external returns (uint256);
    }

    /// Read-only view over reserves and user positions.
    #[derive(Debug)]
    interface IProtocolDataProvider {
        function getUserReserveData(address asset, address user) external view returns (
            uint256 currentATokenBalance,
            uint256 currentStableDebt,
            uint256 currentVariableDebt,
            uint256 principalStableDebt,
            uint256 scaledVariableDebt,
            uint256 stableBorrowRate,
            uint256 liquidityRate,
            uint40 stableRateLastUpdated,
            bool usageAsCollateralEnabled
        );

        function getReserveConfigurationData(address asset) external view returns (
            uint256 decimals,
            uint256 ltv,
            uint256 liquidationThreshold,
            uint256 liquidationBonus,
            uint256 reserveFactor,
            bool usageAsCollateralEnabled,
            bool borrowingEnabled,
            bool stableBorrowRateEnabled,
            bool isActive,
            bool isFrozen
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolCall;

    #[test]
    fn test_pool_selectors() {
        assert_eq!(hex::encode(ILendingPool::depositCall::SELECTOR), "e8eda9df");
        assert_eq!(hex::encode(ILendingPool::withdrawCall::SELECTOR), "69328dec");
        assert_eq!(hex::encode(ILendingPool::borrowCall::SELECTOR), "a415bcad");
        assert_eq!(hex::encode(ILendingPool::repayCall::SELECTOR), "573ade81");
    }
}

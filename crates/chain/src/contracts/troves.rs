//! Trove-based borrowing (Liquity-style, multi-collateral).
//!
//! Collateral enters through an ERC-4626-like vault whose shares are the
//! trove collateral. Troves are kept in a list sorted by nominal collateral
//! ratio; insertion takes an upper/lower hint pair.

use alloy::sol;

sol! {
    #[derive(Debug)]
    interface IBorrowerOperations {
        function openTrove(
            address _collateral,
            uint256 _collAmount,
            uint256 _maxFeePercentage,
            uint256 _iUSDAmount,
            address _upperHint,
            address _lowerHint
        ) external;

        function closeTrove(address _collateral) external;
    }

    #[derive(Debug)]
    interface ITroveManager {
        function getTroveStatus(address _borrower, address _collateral) external view returns (uint256);
        function getTroveColl(address _borrower, address _collateral) external view returns (uint256);
        function getTroveDebt(address _borrower, address _collateral) external view returns (uint256);
        function getTroveOwnersCount(address _collateral) external view returns (uint256);
    }

    #[derive(Debug)]
    interface IHintHelpers {
        function computeNominalCR(uint256 _coll, uint256 _debt, uint8 _collateralDecimals) external pure returns (uint256);

        function getApproxHint(
            address _collateral,
            uint256 _CR,
            uint256 _numTrials,
            uint256 _inputRandomSeed
        ) external view returns (address hintAddress, uint256 diff, uint256 latestRandomSeed);
    }

    /// Collateral vault wrapping an underlying token.
    #[derive(Debug)]
    interface ICollateralVault {
        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
        function withdraw(uint256 shares) external;
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

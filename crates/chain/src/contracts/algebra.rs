//! Algebra concentrated-liquidity interfaces.
//!
//! Positions are NFTs held by the position manager. Fee growth is tracked
//! per unit of liquidity as Q128.128; price as `sqrt(price) * 2^96`.

use alloy::sol;

sol! {
    #[derive(Debug)]
    interface IAlgebraFactory {
        function poolByPair(address tokenA, address tokenB) external view returns (address pool);
    }

    #[derive(Debug)]
    interface IAlgebraPool {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function totalFeeGrowth0Token() external view returns (uint256);
        function totalFeeGrowth1Token() external view returns (uint256);
        function globalState() external view returns (
            uint160 price,
            int24 tick,
            uint16 feeZto,
            uint16 feeOtz,
            uint16 timepointIndex,
            uint8 communityFeeToken0,
            uint8 communityFeeToken1,
            bool unlocked
        );
    }

    #[derive(Debug)]
    struct MintParams {
        address token0;
        address token1;
        int24 tickLower;
        int24 tickUpper;
        uint256 amount0Desired;
        uint256 amount1Desired;
        uint256 amount0Min;
        uint256 amount1Min;
        address recipient;
        uint256 deadline;
    }

    #[derive(Debug)]
    struct IncreaseLiquidityParams {
        uint256 tokenId;
        uint256 amount0Desired;
        uint256 amount1Desired;
        uint256 amount0Min;
        uint256 amount1Min;
        uint256 deadline;
    }

    #[derive(Debug)]
    struct DecreaseLiquidityParams {
        uint256 tokenId;
        uint128 liquidity;
        uint256 amount0Min;
        uint256 amount1Min;
        uint256 deadline;
    }

    #[derive(Debug)]
    struct CollectParams {
        uint256 tokenId;
        address recipient;
        uint128 amount0Max;
        uint128 amount1Max;
    }

    #[derive(Debug)]
    interface INonfungiblePositionManager {
        function positions(uint256 tokenId) external view returns (
            uint96 nonce,
            address operator,
            address token0,
            address token1,
            int24 tickLower,
            int24 tickUpper,
            uint128 liquidity,
            uint256 feeGrowthInside0LastX128,
            uint256 feeGrowthInside1LastX128,
            uint128 tokensOwed0,
            uint128 tokensOwed1
        );

        function mint(MintParams params) external payable returns (
            uint256 tokenId,
            uint128 liquidity,
            uint256 amount0,
            uint256 amount1
        );

        function increaseLiquidity(IncreaseLiquidityParams params) external payable returns (
            uint128 liquidity,
            uint256 amount0,
            uint256 amount1
        );

        function decreaseLiquidity(DecreaseLiquidityParams params) external payable returns (
            uint256 amount0,
            uint256 amount1
        );

        function collect(CollectParams params) external payable returns (uint256 amount0, uint256 amount1);
        function burn(uint256 tokenId) external payable;
        function balanceOf(address owner) external view returns (uint256);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
    }

    /// Off-chain helper deployed alongside the pools: sizes a position and
    /// picks a tick range for a given risk level.
    #[derive(Debug)]
    interface ILiquidityCalculator {
        function calculateOptimalAmounts(
            address pool,
            uint256 amount0Desired,
            uint256 amount1Desired,
            uint8 riskLevel
        ) external view returns (uint256 amount0, uint256 amount1, int24 tickLower, int24 tickUpper);
    }

    #[derive(Debug)]
    struct ExactInputSingleParams {
        address tokenIn;
        address tokenOut;
        address recipient;
        uint256 deadline;
        uint256 amountIn;
        uint256 amountOutMinimum;
        uint160 limitSqrtPrice;
    }

    #[derive(Debug)]
    struct ExactOutputSingleParams {
        address tokenIn;
        address tokenOut;
        address recipient;
        uint256 deadline;
        uint256 amountOut;
        uint256 amountInMaximum;
        uint160 limitSqrtPrice;
    }

    /// `path` is the packed token addresses of every hop, no fee tiers.
    #[derive(Debug)]
    struct ExactInputParams {
        bytes path;
        address recipient;
        uint256 deadline;
        uint256 amountIn;
        uint256 amountOutMinimum;
    }

    /// `path` runs backwards, from the output token to the input token.
    #[derive(Debug)]
    struct ExactOutputParams {
        bytes path;
        address recipient;
        uint256 deadline;
        uint256 amountOut;
        uint256 amountInMaximum;
    }

    #[derive(Debug)]
    interface ISwapRouter {
        function exactInputSingle(ExactInputSingleParams params) external payable returns (uint256 amountOut);
        function exactOutputSingle(ExactOutputSingleParams params) external payable returns (uint256 amountIn);
        function exactInput(ExactInputParams params) external payable returns (uint256 amountOut);
        function exactOutput(ExactOutputParams params) external payable returns (uint256 amountIn);
    }
}

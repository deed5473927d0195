//! Gravity bridge contract ABI definition
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the bridge
//! contract and the ERC20s it manages.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// Hilo Gravity bridge contract
    #[sol(rpc)]
    contract Gravity {
        /// Execute a batch of outgoing transfers signed by the orchestrator set.
        /// The summed fees are paid to msg.sender.
        function submitBatch(
            bytes[] calldata signatures,
            uint256[] calldata transferIds,
            uint256[] calldata amounts,
            address[] calldata destinations,
            uint256[] calldata fees,
            uint256 batchNonce,
            address tokenContract
        ) external;

        /// Lock tokens for a Hilo recipient
        function sendToCosmos(address tokenContract, string calldata destination, uint256 amount) external;

        /// Deploy a fresh ERC20 representing a Hilo denom
        function deployERC20(
            string calldata cosmosDenom,
            string calldata name,
            string calldata symbol,
            uint8 decimals
        ) external;

        function lastBatchNonce(address erc20Address) external view returns (uint256 nonce);

        /// Latest ERC20 deployed for a denom
        function denomToERC20(string calldata cosmosDenom) external view returns (address token);

        event SendToCosmosEvent(
            address indexed tokenContract,
            address indexed sender,
            string destination,
            uint256 amount,
            uint256 eventNonce
        );

        event TransactionBatchExecutedEvent(
            uint256 indexed batchNonce,
            address indexed token,
            address relayer,
            uint256 eventNonce
        );

        event ERC20DeployedEvent(
            string cosmosDenom,
            address indexed tokenContract,
            string name,
            string symbol,
            uint8 decimals,
            uint256 eventNonce
        );
    }
}

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function name() external view returns (string memory tokenName);
        function symbol() external view returns (string memory tokenSymbol);
        function decimals() external view returns (uint8 tokenDecimals);
        function balanceOf(address account) external view returns (uint256 balance);
        function approve(address spender, uint256 amount) external returns (bool success);
    }
}

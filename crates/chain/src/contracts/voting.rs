//! Gauge voting with vote-escrowed NFTs.
//!
//! Each voter type (veMODE, veBPT) has its own voter, epoch clock and
//! escrow contract. Vote weights are relative; the voter normalizes them.

use alloy::sol;

sol! {
    #[derive(Debug)]
    struct GaugeVote {
        uint256 weight;
        address gauge;
    }

    #[derive(Debug)]
    struct Gauge {
        bool active;
        uint256 created;
        string metadataURI;
    }

    #[derive(Debug)]
    interface IGaugeVoter {
        function getAllGauges() external view returns (address[] memory);
        function getGauge(address gauge) external view returns (Gauge memory);
        function gaugeVotes(address gauge) external view returns (uint256);
        function usedVotingPower(uint256 tokenId) external view returns (uint256);
        function vote(uint256 tokenId, GaugeVote[] calldata votes) external;
        function reset(uint256 tokenId) external;
    }

    #[derive(Debug)]
    interface IEpochClock {
        function votingActive() external view returns (bool);
    }

    #[derive(Debug)]
    interface IVotingEscrow {
        function isApprovedOrOwner(address spender, uint256 tokenId) external view returns (bool);
        function votingPowerAt(uint256 tokenId, uint256 timestamp) external view returns (uint256);
    }
}

//! GraphQL documents for the pools, swaps and Tigris subgraphs.
//!
//! Every query takes a single `$skip` variable and returns at most one page
//! of records ordered by timestamp, so pagination stays stable across calls.

/// A paged query and the key its records live under in `data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubgraphQuery {
    pub entity: &'static str,
    pub document: &'static str,
}

pub const POOL_DEPOSITS: SubgraphQuery = SubgraphQuery {
    entity: "mints",
    document: r#"
    query getPoolDeposits($skip: Int!) {
      mints(first: 1000, skip: $skip, orderBy: timestamp_, orderDirection: asc) {
        timestamp_
        contractId_
        sender
        amount0
        amount1
        transactionHash_
        block_number
      }
    }
    "#,
};

pub const POOL_WITHDRAWALS: SubgraphQuery = SubgraphQuery {
    entity: "burns",
    document: r#"
    query getPoolWithdrawals($skip: Int!) {
      burns(first: 1000, skip: $skip, orderBy: timestamp_, orderDirection: asc) {
        timestamp_
        contractId_
        sender
        amount0
        amount1
        transactionHash_
        block_number
      }
    }
    "#,
};

pub const SWAPS: SubgraphQuery = SubgraphQuery {
    entity: "swaps",
    document: r#"
    query getSwaps($skip: Int!) {
      swaps(first: 1000, skip: $skip, orderBy: timestamp_, orderDirection: asc) {
        timestamp_
        contractId_
        sender
        to
        amount0In
        amount0Out
        amount1In
        amount1Out
        transactionHash_
        block_number
      }
    }
    "#,
};

pub const SWAP_FEES: SubgraphQuery = SubgraphQuery {
    entity: "fees",
    document: r#"
    query getFeesForSwaps($skip: Int!) {
      fees(first: 1000, skip: $skip, orderBy: timestamp_, orderDirection: asc) {
        timestamp_
        contractId_
        amount0
        amount1
        transactionHash_
      }
    }
    "#,
};

pub const POOL_VOLUMES: SubgraphQuery = SubgraphQuery {
    entity: "poolVolumes",
    document: r#"
    query getPoolVolumes($skip: Int!) {
      poolVolumes(first: 1000, skip: $skip, orderBy: timestamp, orderDirection: asc) {
        id
        timestamp
        pool {
          name
          token0 { symbol }
          token1 { symbol }
        }
        totalVolume0
        totalVolume1
      }
    }
    "#,
};

pub const POOL_FEES: SubgraphQuery = SubgraphQuery {
    entity: "feesStats_collection",
    document: r#"
    query getTotalPoolFees($skip: Int!) {
      feesStats_collection(first: 1000, skip: $skip, orderBy: timestamp, orderDirection: asc) {
        id
        timestamp
        pool {
          name
          token0 { symbol }
          token1 { symbol }
        }
        totalFees0
        totalFees1
      }
    }
    "#,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_select_their_entity_and_page() {
        for q in [POOL_DEPOSITS, POOL_WITHDRAWALS, SWAPS, SWAP_FEES, POOL_VOLUMES, POOL_FEES] {
            assert!(q.document.contains(&format!("{}(first: 1000, skip: $skip", q.entity)), "{}", q.entity);
            assert!(q.document.contains("$skip: Int!"));
        }
    }
}

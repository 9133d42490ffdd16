//! Generated protobuf and gRPC client code for the Cosmos SDK and CosmWasm
//! query services used by the CosmWasm registry adapter.

pub mod cosmwasm {
    pub mod wasm {
        pub mod v1 {
            include!("cosmwasm.wasm.v1.rs");
        }
    }
}

pub mod cosmos {
    pub mod base {
        pub mod abci {
            pub mod v1beta1 {
                include!("cosmos.base.abci.v1beta1.rs");
            }
        }
        pub mod tendermint {
            pub mod v1beta1 {
                include!("cosmos.base.tendermint.v1beta1.rs");
            }
        }
    }
    pub mod tx {
        pub mod v1beta1 {
            include!("cosmos.tx.v1beta1.rs");
        }
    }
}

pub mod tendermint {
    pub mod types {
        include!("tendermint.types.rs");
    }
}

//! Generated etcd v3 protocol types.
//!
//! Only the subset this client speaks is compiled: `KV.Range` (the connect
//! health check), `KV.Put` and the bidirectional `Watch.Watch` stream. Both
//! packages must stay siblings, the generated `etcdserverpb` code refers to
//! `super::mvccpb`.

mod ext;
pub use ext::*;


pub mod mvccpb {
    tonic::include_proto!("mvccpb");
}

pub mod etcdserverpb {
    tonic::include_proto!("etcdserverpb");
}

mod lifecycle_case;
mod rpc_case;

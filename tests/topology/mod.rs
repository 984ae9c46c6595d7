mod edit_replicaset_case;
mod expel_case;
mod join_case;

mod catch_up_case;
mod stage_failure_case;

mod switchover_case;

mod gate_case;

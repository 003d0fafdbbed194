mod sync_flow;

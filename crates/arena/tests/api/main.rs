mod contest_flow_test;
mod helpers;
mod payment_flow_test;

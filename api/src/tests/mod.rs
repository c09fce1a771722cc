mod routes_test;
